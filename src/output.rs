//! Plan persistence.
//!
//! Plans are written as YAML to `<output dir>/osplan-<pipeline>.yaml` so an
//! operator can diff what two builds would do. Empty fields are omitted by
//! the plan's own serialization.

use crate::config::RunConfig;
use crate::error::{PlanError, Result};
use crate::plan::{PlanDocument, StagePlan};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Serialize a plan to YAML text.
pub fn to_yaml(plan: &StagePlan) -> Result<String> {
    Ok(serde_yaml::to_string(plan)?)
}

/// Write `plan` to its fixed path under the configured output directory.
pub fn write_plan(config: &RunConfig, plan: &StagePlan) -> Result<PathBuf> {
    let path = config.plan_path(plan.pipeline());
    write_plan_to(&path, plan)?;
    Ok(path)
}

/// Write `plan` to `path`, creating parent directories.
pub fn write_plan_to(path: &Path, plan: &StagePlan) -> Result<()> {
    let yaml = to_yaml(plan)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    fs::write(path, yaml).map_err(|source| io_error(path, source))?;
    info!("wrote {} plan ({} stages) to {}", plan.pipeline(), plan.stage_count(), path.display());
    Ok(())
}

/// Read a persisted plan back for auditing.
pub fn load_plan(path: &Path) -> Result<PlanDocument> {
    let content = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    Ok(serde_yaml::from_str(&content)?)
}

fn io_error(path: &Path, source: std::io::Error) -> PlanError {
    PlanError::Io {
        path: path.display().to_string(),
        source,
    }
}
