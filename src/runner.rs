//! "Run named phase" interface.
//!
//! Executing stages against a real filesystem belongs to an external
//! collaborator implementing [`PhaseRunner`]. This module only defines the
//! contract, feeds a plan through it in phase order ([`run_pipeline`]) and
//! ships a dry-run implementation ([`LoggingRunner`]).
//!
//! # What This Explicitly Refuses To Do
//!
//! - Roll back: phases that already ran stay applied when a later one fails
//! - Retry: retry policy belongs to the runner

use crate::error::{PlanError, Result};
use crate::plan::{Stage, StagePlan};
use crate::types::{Family, Phase};
use std::path::Path;
use tracing::info;

/// Executes the stages of one phase against a target root.
pub trait PhaseRunner {
    fn run_phase(&mut self, root: &Path, phase: Phase, stages: &[Stage]) -> anyhow::Result<()>;
}

/// Run every phase of `plan` in order, stopping at the first failure.
///
/// The error names the phase that failed. Earlier phases are not undone.
pub fn run_pipeline(runner: &mut dyn PhaseRunner, root: &Path, plan: &StagePlan) -> Result<()> {
    for (phase, stages) in plan.phases() {
        info!("running phase {} ({} stages) on {}", phase, stages.len(), root.display());
        runner
            .run_phase(root, phase, stages)
            .map_err(|source| PlanError::Execute { phase, source })?;
    }
    Ok(())
}

/// Dry-run runner: evaluates family predicates and logs what would run.
///
/// Shell conditions cannot be checked without the target, so stages carrying
/// one are reported as conditional and counted as run.
#[derive(Debug, Clone)]
pub struct LoggingRunner {
    family: Family,
    ran: Vec<(Phase, String)>,
    skipped: Vec<(Phase, String)>,
}

impl LoggingRunner {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            ran: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Stages that would have run, in order.
    pub fn ran(&self) -> &[(Phase, String)] {
        &self.ran
    }

    /// Stages whose family predicate excluded them.
    pub fn skipped(&self) -> &[(Phase, String)] {
        &self.skipped
    }
}

impl PhaseRunner for LoggingRunner {
    fn run_phase(&mut self, root: &Path, phase: Phase, stages: &[Stage]) -> anyhow::Result<()> {
        for stage in stages {
            let predicate = stage.predicate();
            if !predicate.matches_family(self.family) {
                info!("[dry-run] {}: skip '{}' (not for {})", phase, stage.name(), self.family);
                self.skipped.push((phase, stage.name().to_string()));
                continue;
            }
            match &predicate.condition {
                Some(condition) => info!(
                    "[dry-run] {}: would run '{}' in {} if `{}`",
                    phase,
                    stage,
                    root.display(),
                    condition
                ),
                None => info!("[dry-run] {}: would run '{}' in {}", phase, stage, root.display()),
            }
            self.ran.push((phase, stage.name().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Pipeline;
    use anyhow::bail;
    use std::collections::BTreeMap;

    fn plan() -> StagePlan {
        let mut stages = BTreeMap::new();
        stages.insert(
            Phase::Install,
            vec![
                Stage::builder("apt").only_families(&[Family::Debian]).build(),
                Stage::builder("apk").only_families(&[Family::Alpine]).build(),
            ],
        );
        stages.insert(Phase::Init, vec![Stage::builder("kernel").build()]);
        StagePlan::new("t", Pipeline::All, stages)
    }

    #[test]
    fn test_logging_runner_evaluates_family() {
        let mut runner = LoggingRunner::new(Family::Debian);
        run_pipeline(&mut runner, Path::new("/"), &plan()).unwrap();
        let ran: Vec<&str> = runner.ran().iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(ran, vec!["apt", "kernel"]);
        assert_eq!(runner.skipped()[0], (Phase::Install, "apk".to_string()));
    }

    struct FailAt {
        phase: Phase,
        seen: Vec<Phase>,
    }

    impl PhaseRunner for FailAt {
        fn run_phase(&mut self, _root: &Path, phase: Phase, _stages: &[Stage]) -> anyhow::Result<()> {
            self.seen.push(phase);
            if phase == self.phase {
                bail!("disk full");
            }
            Ok(())
        }
    }

    #[test]
    fn test_pipeline_stops_at_failing_phase() {
        let mut runner = FailAt {
            phase: Phase::AfterInstall,
            seen: Vec::new(),
        };
        let err = run_pipeline(&mut runner, Path::new("/"), &plan()).unwrap_err();
        assert_eq!(err.phase(), Some(Phase::AfterInstall));
        assert!(format!("{:#}", anyhow::Error::from(err)).ends_with(": disk full"));
        assert_eq!(
            runner.seen,
            vec![Phase::BeforeInstall, Phase::Install, Phase::AfterInstall]
        );
    }
}
