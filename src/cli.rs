use crate::config::RunConfig;
use crate::types::{Model, Pipeline, Provider, Variant};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// osplan - provisioning plan generator for appliance OS images
#[derive(Parser, Debug)]
#[command(name = "osplan")]
#[command(about = "Resolve packages and compose a phase-ordered provisioning plan for the detected OS")]
#[command(version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG overrides it.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Dry-run mode: print the plan and walk it with the logging runner
    /// instead of writing it to the output directory.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Read OS identification from this file instead of /etc/os-release
    #[arg(long, global = true)]
    pub os_release: Option<PathBuf>,

    /// Pipeline to plan: install, init or all
    #[arg(short, long, global = true, default_value = "all")]
    pub stage: Pipeline,

    /// Image variant: core or standard
    #[arg(long, global = true, default_value = "core")]
    pub variant: Variant,

    /// Hardware model: generic, rpi3, rpi4, nvidia-agx-orin
    #[arg(short, long, global = true, default_value = "generic")]
    pub model: Model,

    /// Kubernetes provider for the standard variant: k3s or k0s
    #[arg(long, global = true, default_value = "none")]
    pub provider: Provider,

    /// Kubernetes provider version
    #[arg(long, global = true)]
    pub k8s_version: Option<String>,

    /// Image version recorded in the release metadata (semver, `v` prefix allowed)
    #[arg(long, global = true, default_value = "v0.0.1")]
    pub image_version: String,

    /// Image name used for branding and release metadata
    #[arg(long, global = true, default_value = "osplan")]
    pub image_name: String,

    /// Build for trusted boot (pre-signed UKI instead of grub + initrd)
    #[arg(long, global = true)]
    pub trusted_boot: bool,

    /// Enable FIPS mode
    #[arg(long, global = true)]
    pub fips: bool,

    /// Numbered extension fragments (default: $OSPLAN_EXTENSIONS_DIR or /etc/osplan/extensions)
    #[arg(long, global = true)]
    pub extensions_dir: Option<PathBuf>,

    /// Stage extensions (default: $OSPLAN_STAGE_EXTENSIONS_DIR or /etc/osplan/stage-extensions)
    #[arg(long, global = true)]
    pub stage_extensions_dir: Option<PathBuf>,

    /// Directory plans are written to
    #[arg(
        short,
        long,
        global = true,
        env = "OSPLAN_OUTPUT_DIR",
        default_value = crate::config::DEFAULT_OUTPUT_DIR
    )]
    pub output_dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Compose the stage plan and write it (default)
    Plan {
        /// Target root whose installed kernels are probed
        #[arg(long, default_value = "/")]
        root: PathBuf,
    },
    /// Print the detected system descriptor
    Detect {
        /// Print JSON instead of YAML
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved package list, one per line
    Packages {
        /// Print a JSON array instead
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Subcommand to run, `plan` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Plan {
            root: PathBuf::from("/"),
        })
    }

    /// Build the run configuration. Validation is left to the caller.
    pub fn to_config(&self) -> RunConfig {
        let (env_extensions, env_stage_extensions) = RunConfig::extension_dirs_from_env();
        RunConfig {
            pipeline: self.stage,
            variant: self.variant,
            model: self.model,
            provider: self.provider,
            k8s_version: self.k8s_version.clone(),
            image_version: self.image_version.clone(),
            image_name: self.image_name.clone(),
            trusted_boot: self.trusted_boot,
            fips: self.fips,
            extensions_dir: self.extensions_dir.clone().unwrap_or(env_extensions),
            stage_extensions_dir: self
                .stage_extensions_dir
                .clone()
                .unwrap_or(env_stage_extensions),
            output_dir: self.output_dir.clone(),
        }
    }
}
