//! Built-in stage generators.
//!
//! Each generator owns one concern (repositories, kernel linking, release
//! metadata, ...) and produces the stages for exactly one phase. The
//! composer calls them in registration order; see [`builtin`].
//!
//! # Design
//!
//! - **Pure**: generators read the [`PlanContext`] and return stages. Any
//!   I/O they need (asset bodies, installed kernels) goes through the
//!   collaborators carried by the context.
//! - **Boot categories**: a generator is tagged [`BootCategory::Legacy`] or
//!   [`BootCategory::Trusted`] when it only makes sense for one boot mode.
//!   The composer runs one branch or the other, never both.
//!
//! # What This Explicitly Refuses To Do
//!
//! - Evaluate predicates: stages for every family may be emitted, gated by
//!   their predicate, and the executor picks.

pub mod boot;
pub mod init;
pub mod install;
pub mod provider;

use crate::assets::AssetStore;
use crate::config::RunConfig;
use crate::plan::Stage;
use crate::probe::KernelProbe;
use crate::system::SystemDescriptor;
use crate::types::Phase;
use anyhow::Result;

/// Which boot mode a generator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootCategory {
    /// Runs in every composition
    Always,
    /// Legacy bootloader and initrd handling; suppressed by trusted boot
    Legacy,
    /// Pre-signed image handling; only with trusted boot
    Trusted,
}

impl BootCategory {
    pub fn applies(self, trusted_boot: bool) -> bool {
        match self {
            Self::Always => true,
            Self::Legacy => !trusted_boot,
            Self::Trusted => trusted_boot,
        }
    }
}

/// Everything a generator may look at.
pub struct PlanContext<'a> {
    pub config: &'a RunConfig,
    pub system: &'a SystemDescriptor,
    /// Resolved package list; empty outside the install phase
    pub packages: &'a [String],
    pub assets: &'a dyn AssetStore,
    pub probe: &'a dyn KernelProbe,
}

/// Producer of the stages for one concern in one phase.
pub trait StageGenerator {
    /// Stable identifier used in logs and errors.
    fn name(&self) -> &'static str;

    fn phase(&self) -> Phase;

    fn category(&self) -> BootCategory {
        BootCategory::Always
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>>;
}

/// The built-in generators in registration order.
///
/// Within a phase, this order is the order the stages appear in the plan.
pub fn builtin() -> Vec<Box<dyn StageGenerator>> {
    vec![
        // before-install
        Box::new(install::Repositories),
        // install
        Box::new(install::BasePackages),
        Box::new(provider::ProviderInstall),
        // after-install
        Box::new(install::Branding),
        Box::new(install::OemConfigs),
        Box::new(boot::GrubBootArgs),
        Box::new(boot::UkiCmdline),
        // before-init
        Box::new(init::Workarounds),
        // init
        Box::new(boot::KernelLink),
        Box::new(boot::InitrdRebuild),
        Box::new(boot::InitrdRemoval),
        Box::new(init::ReleaseMetadata),
        Box::new(init::Services),
        // after-init
        Box::new(init::Cleanup),
    ]
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_category_applies() {
        assert!(BootCategory::Always.applies(true));
        assert!(BootCategory::Always.applies(false));
        assert!(BootCategory::Legacy.applies(false));
        assert!(!BootCategory::Legacy.applies(true));
        assert!(BootCategory::Trusted.applies(true));
        assert!(!BootCategory::Trusted.applies(false));
    }

    #[test]
    fn test_builtin_registry_grouped_by_phase() {
        let generators = builtin();
        let phases: Vec<Phase> = generators.iter().map(|g| g.phase()).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted, "registry must be listed in phase order");
    }

    #[test]
    fn test_builtin_names_unique() {
        let generators = builtin();
        let mut names: Vec<&str> = generators.iter().map(|g| g.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), generators.len());
    }

    #[test]
    fn test_each_boot_mode_has_its_own_generators() {
        let generators = builtin();
        assert!(generators.iter().any(|g| g.category() == BootCategory::Legacy));
        assert!(generators.iter().any(|g| g.category() == BootCategory::Trusted));
    }
}
