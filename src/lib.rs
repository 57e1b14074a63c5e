//! osplan library
//!
//! Resolves the package set for a detected OS target and composes the
//! phase-ordered provisioning plan (install and init pipelines) that turns a
//! minimal OS image into a bootable appliance image.

pub mod assets;
pub mod cli;
pub mod config;
pub mod error;
pub mod extensions;
pub mod logic;
pub mod matrices;
pub mod output;
pub mod plan;
pub mod probe;
pub mod runner;
pub mod stages;
pub mod system;
pub mod types;

// Re-export main types for convenience
pub use config::RunConfig;
pub use error::{ConfigError, PlanError, ResolveError, TemplateError, VersionError};
pub use plan::{Predicate, Stage, StageBuilder, StagePlan};
pub use system::{OsRelease, SystemDescriptor};
pub use types::{Architecture, Distro, Family, Model, Phase, Pipeline, Provider, Variant};

// Package Matrix Resolver
pub use logic::matrix::{ArchAxis, PackageMatrix, Target, VersionMap};
pub use logic::resolver::resolve_packages;

// Stage Plan Composer
pub use logic::composer::{compose_plan, Composer};
pub use stages::{BootCategory, PlanContext, StageGenerator};

// Collaborators
pub use assets::{AssetStore, BuiltinAssets, MemoryAssets};
pub use extensions::{DirectoryFragments, FragmentSource, StaticFragments};
pub use probe::{FsKernelProbe, KernelProbe, StaticKernelProbe};
pub use runner::{run_pipeline, LoggingRunner, PhaseRunner};
