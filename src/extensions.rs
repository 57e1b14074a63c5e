//! Extension Fragment Loader.
//!
//! Operators drop YAML fragments into a directory to append their own stages
//! to any phase:
//!
//! ```yaml
//! stages:
//!   after-install:
//!     - name: Install monitoring agent
//!       packages:
//!         install: [node-exporter]
//! ```
//!
//! # Loading Rules
//!
//! | Condition | Handling |
//! |-----------|----------|
//! | File order | lexicographic by file name (`10-a.yaml` before `20-b.yaml`) |
//! | Extension other than `.yaml`/`.yml` | skipped with a notice |
//! | File fails to read or parse | logged, that file contributes nothing |
//! | Unknown phase key | logged, that key is ignored |
//! | Directory missing | no fragments |
//!
//! One bad file never aborts loading of the others.

use crate::plan::{PlanDocument, Stage};
use crate::types::Phase;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

const FRAGMENT_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Provider of extension stages for a phase.
pub trait FragmentSource {
    /// Where the fragments come from, for logs.
    fn origin(&self) -> String;

    /// Stages for `phase`, in merge order.
    fn stages_for(&self, phase: Phase) -> Vec<Stage>;
}

// ============================================================================
// Directory-backed fragments
// ============================================================================

/// Fragments read from one directory.
///
/// The directory is read once, when loaded; later changes on disk are not
/// picked up.
#[derive(Debug, Clone, Default)]
pub struct DirectoryFragments {
    dir: PathBuf,
    files: Vec<PathBuf>,
    stages: BTreeMap<Phase, Vec<Stage>>,
}

impl DirectoryFragments {
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let mut fragments = Self {
            dir,
            ..Self::default()
        };

        for path in fragment_files(&fragments.dir) {
            match parse_fragment(&path) {
                Ok(stages) => {
                    debug!("loaded fragment {}", path.display());
                    for (phase, list) in stages {
                        fragments.stages.entry(phase).or_default().extend(list);
                    }
                    fragments.files.push(path);
                }
                Err(reason) => warn!("skipping extension fragment {}: {}", path.display(), reason),
            }
        }

        if !fragments.files.is_empty() {
            info!(
                "loaded {} extension fragment(s) from {}",
                fragments.files.len(),
                fragments.dir.display()
            );
        }
        fragments
    }

    /// Files that were parsed successfully, in merge order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl FragmentSource for DirectoryFragments {
    fn origin(&self) -> String {
        self.dir.display().to_string()
    }

    fn stages_for(&self, phase: Phase) -> Vec<Stage> {
        self.stages.get(&phase).cloned().unwrap_or_default()
    }
}

/// Candidate fragment files, sorted by file name.
fn fragment_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("extension directory {} does not exist", dir.display());
            return Vec::new();
        }
        Err(e) => {
            warn!("cannot read extension directory {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!("cannot read entry in {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|path| path.is_file())
        .filter(|path| {
            let recognised = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| FRAGMENT_EXTENSIONS.contains(&ext));
            if !recognised {
                info!("ignoring {}: not a .yaml/.yml file", path.display());
            }
            recognised
        })
        .collect();

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

fn parse_fragment(path: &Path) -> Result<Vec<(Phase, Vec<Stage>)>, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let doc: PlanDocument = serde_yaml::from_str(&content).map_err(|e| e.to_string())?;

    let mut stages = Vec::new();
    for (key, list) in doc.stages {
        match Phase::from_str(&key) {
            Ok(phase) => {
                for stage in list.iter().filter(|s| s.is_noop()) {
                    warn!("{}: stage '{}' in {} does nothing", path.display(), stage.name(), phase);
                }
                stages.push((phase, list));
            }
            Err(_) => warn!("{}: unknown phase '{}', ignoring its stages", path.display(), key),
        }
    }
    Ok(stages)
}

// ============================================================================
// In-memory fragments
// ============================================================================

/// Fragments supplied directly, for embedding callers and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFragments {
    origin: String,
    stages: BTreeMap<Phase, Vec<Stage>>,
}

impl StaticFragments {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            stages: BTreeMap::new(),
        }
    }

    pub fn with(mut self, phase: Phase, stage: Stage) -> Self {
        self.stages.entry(phase).or_default().push(stage);
        self
    }
}

impl FragmentSource for StaticFragments {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn stages_for(&self, phase: Phase) -> Vec<Stage> {
        self.stages.get(&phase).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(stages: &[Stage]) -> Vec<&str> {
        stages.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let fragments = DirectoryFragments::load("/nonexistent/osplan/extensions");
        assert!(fragments.files().is_empty());
        assert!(fragments.stages_for(Phase::Init).is_empty());
    }

    #[test]
    fn test_unknown_phase_key_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("10-x.yaml"),
            "stages:\n  boot:\n    - name: nope\n  init:\n    - name: kept\n",
        )
        .unwrap();

        let fragments = DirectoryFragments::load(dir.path());
        assert_eq!(names(&fragments.stages_for(Phase::Init)), vec!["kept"]);
        assert_eq!(fragments.files().len(), 1);
    }

    #[test]
    fn test_yml_extension_accepted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yml"), "stages:\n  install:\n    - name: a\n").unwrap();
        let fragments = DirectoryFragments::load(dir.path());
        assert_eq!(names(&fragments.stages_for(Phase::Install)), vec!["a"]);
    }

    #[test]
    fn test_subdirectories_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested.yaml")).unwrap();
        let fragments = DirectoryFragments::load(dir.path());
        assert!(fragments.files().is_empty());
    }

    #[test]
    fn test_static_fragments() {
        let source = StaticFragments::new("test")
            .with(Phase::Init, Stage::builder("one").build())
            .with(Phase::Init, Stage::builder("two").build());
        assert_eq!(names(&source.stages_for(Phase::Init)), vec!["one", "two"]);
        assert!(source.stages_for(Phase::Install).is_empty());
        assert_eq!(source.origin(), "test");
    }
}
