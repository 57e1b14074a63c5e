//! Stage Plan Composer
//!
//! Assembles a [`StagePlan`] from the built-in stage generators and the
//! extension fragment sources.
//!
//! # Ordering Contract
//!
//! | Level | Order |
//! |-------|-------|
//! | Phases | fixed: before-install, install, after-install, before-init, init, after-init |
//! | Within a phase | built-in generators in registration order, then fragment sources in the order they were added |
//! | Within a source | append order |
//!
//! An `all` composition finishes every install-pipeline phase (including
//! package resolution) before it starts on the init pipeline.
//!
//! # Design
//!
//! - **Pure**: given the same config, descriptor and collaborators the plan
//!   is identical; nothing is cached between calls.
//! - **Boot branches**: trusted boot runs the `Trusted` generators and
//!   suppresses the `Legacy` ones, and vice versa.
//! - **All or nothing**: the first failure aborts the whole plan and is
//!   reported with its phase; no partial plan is returned.
//!
//! # What This Explicitly Refuses To Do
//!
//! - Evaluate stage predicates
//! - Reorder, dedupe or drop stages contributed by fragments

use crate::assets::AssetStore;
use crate::config::RunConfig;
use crate::error::{PlanError, Result};
use crate::extensions::FragmentSource;
use crate::logic::resolver::resolve_packages;
use crate::matrices;
use crate::plan::{Stage, StagePlan};
use crate::probe::KernelProbe;
use crate::stages::{self, PlanContext, StageGenerator};
use crate::system::SystemDescriptor;
use crate::types::Phase;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Composer wired to its collaborators.
pub struct Composer<'a> {
    generators: Vec<Box<dyn StageGenerator>>,
    fragments: Vec<&'a dyn FragmentSource>,
    assets: &'a dyn AssetStore,
    probe: &'a dyn KernelProbe,
}

impl<'a> Composer<'a> {
    /// Composer with the built-in generators and no fragment sources.
    pub fn new(assets: &'a dyn AssetStore, probe: &'a dyn KernelProbe) -> Self {
        Self::with_generators(stages::builtin(), assets, probe)
    }

    /// Composer with a custom generator set, in registration order.
    pub fn with_generators(
        generators: Vec<Box<dyn StageGenerator>>,
        assets: &'a dyn AssetStore,
        probe: &'a dyn KernelProbe,
    ) -> Self {
        Self {
            generators,
            fragments: Vec::new(),
            assets,
            probe,
        }
    }

    /// Append a fragment source. Sources merge in the order they are added.
    pub fn fragments(mut self, source: &'a dyn FragmentSource) -> Self {
        self.fragments.push(source);
        self
    }

    /// Compose the plan for `config.pipeline`.
    pub fn compose(&self, config: &RunConfig, system: &SystemDescriptor) -> Result<StagePlan> {
        info!("composing {} plan for {}", config.pipeline, system);

        let mut packages: Vec<String> = Vec::new();
        let mut phases: BTreeMap<Phase, Vec<Stage>> = BTreeMap::new();

        for &phase in config.pipeline.phases() {
            if phase == Phase::Install {
                packages = resolve_packages(
                    system,
                    matrices::COMMON_PACKAGES,
                    &matrices::select(config),
                )
                .map_err(|source| PlanError::Resolve { phase, source })?;
                debug!("resolved {} packages", packages.len());
            }

            let phase_packages: &[String] = if phase == Phase::Install { &packages } else { &[] };
            let ctx = PlanContext {
                config,
                system,
                packages: phase_packages,
                assets: self.assets,
                probe: self.probe,
            };

            let stages = self.compose_phase(phase, &ctx)?;
            info!("phase {}: {} stage(s)", phase, stages.len());
            phases.insert(phase, stages);
        }

        Ok(StagePlan::new(config.image_name.clone(), config.pipeline, phases))
    }

    fn compose_phase(&self, phase: Phase, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let mut stages = Vec::new();

        for generator in self.generators.iter().filter(|g| g.phase() == phase) {
            if !generator.category().applies(ctx.config.trusted_boot) {
                debug!("phase {}: {} not used in this boot mode", phase, generator.name());
                continue;
            }
            let generated = generator
                .generate(ctx)
                .map_err(|source| PlanError::Generator {
                    phase,
                    generator: generator.name().to_string(),
                    source,
                })?;
            debug!("phase {}: {} -> {} stage(s)", phase, generator.name(), generated.len());
            stages.extend(generated);
        }

        for source in &self.fragments {
            let extra = source.stages_for(phase);
            if !extra.is_empty() {
                debug!("phase {}: {} extension stage(s) from {}", phase, extra.len(), source.origin());
            }
            stages.extend(extra);
        }

        Ok(stages)
    }
}

/// Compose with the built-in generators and the given fragment sources.
pub fn compose_plan(
    config: &RunConfig,
    system: &SystemDescriptor,
    assets: &dyn AssetStore,
    probe: &dyn KernelProbe,
    fragments: &[&dyn FragmentSource],
) -> Result<StagePlan> {
    let mut composer = Composer::new(assets, probe);
    for source in fragments {
        composer = composer.fragments(*source);
    }
    composer.compose(config, system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssets;
    use crate::extensions::StaticFragments;
    use crate::probe::StaticKernelProbe;
    use crate::types::{Architecture, Distro, Family, Pipeline};
    use anyhow::anyhow;

    fn ubuntu() -> SystemDescriptor {
        SystemDescriptor {
            distro: Distro::Ubuntu,
            family: Family::Debian,
            arch: Architecture::Amd64,
            version: "24.04".to_string(),
            name: "Ubuntu 24.04".to_string(),
        }
    }

    struct Fixed(&'static str, Phase);

    impl StageGenerator for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }
        fn phase(&self) -> Phase {
            self.1
        }
        fn generate(&self, _ctx: &PlanContext<'_>) -> anyhow::Result<Vec<Stage>> {
            Ok(vec![Stage::builder(self.0).build()])
        }
    }

    struct Failing;

    impl StageGenerator for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn phase(&self) -> Phase {
            Phase::AfterInstall
        }
        fn generate(&self, _ctx: &PlanContext<'_>) -> anyhow::Result<Vec<Stage>> {
            Err(anyhow!("boom"))
        }
    }

    fn names(plan: &StagePlan, phase: Phase) -> Vec<String> {
        plan.stages(phase).iter().map(|s| s.name().to_string()).collect()
    }

    #[test]
    fn test_fragments_follow_builtins() {
        let assets = MemoryAssets::new();
        let probe = StaticKernelProbe::default();
        let first = StaticFragments::new("first").with(Phase::Init, Stage::builder("ext-1").build());
        let second = StaticFragments::new("second").with(Phase::Init, Stage::builder("ext-2").build());
        let composer = Composer::with_generators(
            vec![Box::new(Fixed("a", Phase::Init)), Box::new(Fixed("b", Phase::Init))],
            &assets,
            &probe,
        )
        .fragments(&first)
        .fragments(&second);

        let config = RunConfig {
            pipeline: Pipeline::Init,
            ..RunConfig::default()
        };
        let plan = composer.compose(&config, &ubuntu()).unwrap();
        assert_eq!(names(&plan, Phase::Init), vec!["a", "b", "ext-1", "ext-2"]);
    }

    #[test]
    fn test_generator_error_carries_phase() {
        let assets = MemoryAssets::new();
        let probe = StaticKernelProbe::default();
        let composer = Composer::with_generators(vec![Box::new(Failing)], &assets, &probe);
        let err = composer.compose(&RunConfig::default(), &ubuntu()).unwrap_err();
        assert_eq!(err.phase(), Some(Phase::AfterInstall));
        assert!(err.to_string().contains("failing"));
        assert!(format!("{:#}", anyhow::Error::from(err)).ends_with(": boom"));
    }

    #[test]
    fn test_resolution_error_reported_for_install_phase() {
        let assets = MemoryAssets::new();
        let probe = StaticKernelProbe::default();
        let composer = Composer::with_generators(Vec::new(), &assets, &probe);
        let mut system = ubuntu();
        system.version = "rolling".to_string();
        let err = composer.compose(&RunConfig::default(), &system).unwrap_err();
        assert!(matches!(err, PlanError::Resolve { phase: Phase::Install, .. }));
    }

    #[test]
    fn test_init_pipeline_skips_resolution() {
        let assets = MemoryAssets::new();
        let probe = StaticKernelProbe::default();
        let composer = Composer::with_generators(Vec::new(), &assets, &probe);
        let mut system = ubuntu();
        system.version = "rolling".to_string();
        let config = RunConfig {
            pipeline: Pipeline::Init,
            ..RunConfig::default()
        };
        let plan = composer.compose(&config, &system).unwrap();
        assert_eq!(plan.stage_count(), 0);
        assert_eq!(plan.phases().count(), 3);
    }

    #[test]
    fn test_builtin_plan_for_ubuntu() {
        let assets = MemoryAssets::placeholders();
        let probe = StaticKernelProbe::new(["6.8.0-45-generic"]);
        let plan = compose_plan(&RunConfig::default(), &ubuntu(), &assets, &probe, &[]).unwrap();

        let install = plan.stages(Phase::Install);
        assert_eq!(install[0].name(), "Install base packages");
        assert_eq!(install[0].packages().install[0], "curl");

        let init = names(&plan, Phase::Init);
        assert!(init.contains(&"Rebuild initrd".to_string()));
        assert!(!init.contains(&"Remove initrd".to_string()));
    }
}
