//! Stage and StagePlan data model.
//!
//! A [`Stage`] is one unit of provisioning work attached to a phase:
//! packages to add or remove, files and directories to create, commands,
//! service directives and environment-file writes, optionally gated by a
//! [`Predicate`]. A [`StagePlan`] is the ordered phase → stages mapping the
//! composer produces.
//!
//! # Design
//!
//! - **Immutable**: stages are assembled through [`StageBuilder`] and only
//!   expose read accessors; plans are frozen once composed.
//! - **Readable output**: empty and zero-valued fields are omitted when
//!   serialized, and file modes are written as octal strings.
//! - **Predicates are data**: nothing here evaluates them; that belongs to
//!   whoever executes the plan.

use crate::types::{Family, Phase, Pipeline};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Stage
// ============================================================================

/// Gate attached to a stage, evaluated by the execution collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Predicate {
    /// Run only on these OS families (empty = every family)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub families: Vec<Family>,
    /// Shell precondition that must succeed
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.families.is_empty() && self.condition.is_none()
    }

    /// Family half of the predicate. The shell condition can only be checked
    /// against a real filesystem and is left to the executor.
    pub fn matches_family(&self, family: Family) -> bool {
        self.families.is_empty() || self.families.contains(&family)
    }
}

/// Package directives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageOps {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
    /// Refresh repository metadata first
    #[serde(default, skip_serializing_if = "is_false")]
    pub refresh: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub upgrade: bool,
}

impl PackageOps {
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.remove.is_empty() && !self.refresh && !self.upgrade
    }
}

/// A file to write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSpec {
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub owner: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub group: u32,
    #[serde(default = "default_file_mode", with = "octal_mode")]
    pub permissions: u32,
}

/// A directory to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySpec {
    pub path: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub owner: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub group: u32,
    #[serde(default = "default_dir_mode", with = "octal_mode")]
    pub permissions: u32,
}

/// Service directives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceOps {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disable: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mask: Vec<String>,
}

impl ServiceOps {
    pub fn is_empty(&self) -> bool {
        self.enable.is_empty() && self.disable.is_empty() && self.mask.is_empty()
    }
}

/// A unit of provisioning work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    name: String,
    #[serde(default, skip_serializing_if = "Predicate::is_empty")]
    when: Predicate,
    #[serde(default, skip_serializing_if = "PackageOps::is_empty")]
    packages: PackageOps,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    directories: Vec<DirectorySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    files: Vec<FileSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    commands: Vec<String>,
    #[serde(default, skip_serializing_if = "ServiceOps::is_empty")]
    services: ServiceOps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    environment_file: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,
}

impl Stage {
    pub fn builder(name: impl Into<String>) -> StageBuilder {
        StageBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn predicate(&self) -> &Predicate {
        &self.when
    }

    pub fn packages(&self) -> &PackageOps {
        &self.packages
    }

    pub fn directories(&self) -> &[DirectorySpec] {
        &self.directories
    }

    pub fn files(&self) -> &[FileSpec] {
        &self.files
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn services(&self) -> &ServiceOps {
        &self.services
    }

    pub fn environment_file(&self) -> Option<&str> {
        self.environment_file.as_deref()
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// True when the stage carries no work at all.
    pub fn is_noop(&self) -> bool {
        self.packages.is_empty()
            && self.directories.is_empty()
            && self.files.is_empty()
            && self.commands.is_empty()
            && self.services.is_empty()
            && self.environment.is_empty()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (packages +{}/-{}, files {}, dirs {}, commands {}, services +{}/-{})",
            self.name,
            self.packages.install.len(),
            self.packages.remove.len(),
            self.files.len(),
            self.directories.len(),
            self.commands.len(),
            self.services.enable.len(),
            self.services.disable.len()
        )
    }
}

/// Builder for [`Stage`]; the only way to assemble one in code.
#[derive(Debug, Clone)]
pub struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stage: Stage {
                name: name.into(),
                when: Predicate::default(),
                packages: PackageOps::default(),
                directories: Vec::new(),
                files: Vec::new(),
                commands: Vec::new(),
                services: ServiceOps::default(),
                environment_file: None,
                environment: BTreeMap::new(),
            },
        }
    }

    pub fn only_families(mut self, families: &[Family]) -> Self {
        self.stage.when.families = families.to_vec();
        self
    }

    pub fn only_if(mut self, condition: impl Into<String>) -> Self {
        self.stage.when.condition = Some(condition.into());
        self
    }

    pub fn install<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage.packages.install.extend(packages.into_iter().map(Into::into));
        self
    }

    pub fn remove<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage.packages.remove.extend(packages.into_iter().map(Into::into));
        self
    }

    pub fn refresh(mut self) -> Self {
        self.stage.packages.refresh = true;
        self
    }

    pub fn directory(mut self, path: impl Into<String>, permissions: u32) -> Self {
        self.stage.directories.push(DirectorySpec {
            path: path.into(),
            owner: 0,
            group: 0,
            permissions,
        });
        self
    }

    pub fn file(mut self, path: impl Into<String>, content: impl Into<String>, permissions: u32) -> Self {
        self.stage.files.push(FileSpec {
            path: path.into(),
            content: content.into(),
            owner: 0,
            group: 0,
            permissions,
        });
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.stage.commands.push(command.into());
        self
    }

    pub fn commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn enable<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage.services.enable.extend(services.into_iter().map(Into::into));
        self
    }

    pub fn disable<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage.services.disable.extend(services.into_iter().map(Into::into));
        self
    }

    pub fn mask<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage.services.mask.extend(services.into_iter().map(Into::into));
        self
    }

    pub fn environment_file(mut self, path: impl Into<String>) -> Self {
        self.stage.environment_file = Some(path.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.stage.environment.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Stage {
        self.stage
    }
}

// ============================================================================
// StagePlan
// ============================================================================

/// Ordered phase → stages mapping.
///
/// Phases always appear in their fixed execution order, each at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    name: String,
    pipeline: Pipeline,
    phases: Vec<(Phase, Vec<Stage>)>,
}

impl StagePlan {
    /// Freeze a plan. Every phase of `pipeline` is present, in order, even
    /// when it has no stages; phases outside the pipeline are dropped.
    pub fn new(name: impl Into<String>, pipeline: Pipeline, mut stages: BTreeMap<Phase, Vec<Stage>>) -> Self {
        let phases = pipeline
            .phases()
            .iter()
            .map(|phase| (*phase, stages.remove(phase).unwrap_or_default()))
            .collect();
        Self {
            name: name.into(),
            pipeline,
            phases,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    /// Phases in execution order with their stages.
    pub fn phases(&self) -> impl Iterator<Item = (Phase, &[Stage])> {
        self.phases.iter().map(|(p, s)| (*p, s.as_slice()))
    }

    /// Stages of one phase (empty when the phase is not part of the plan).
    pub fn stages(&self, phase: Phase) -> &[Stage] {
        self.phases
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, s)| s.as_slice())
            .unwrap_or(&[])
    }

    /// Every stage in execution order, tagged with its phase.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &Stage)> {
        self.phases
            .iter()
            .flat_map(|(p, stages)| stages.iter().map(move |s| (*p, s)))
    }

    pub fn stage_count(&self) -> usize {
        self.phases.iter().map(|(_, s)| s.len()).sum()
    }

    /// Summary for logging.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Stage Plan: {} ({}, {} stages)",
            self.name,
            self.pipeline,
            self.stage_count()
        )];
        for (phase, stages) in self.phases() {
            lines.push(format!("  {}:", phase));
            for (i, stage) in stages.iter().enumerate() {
                lines.push(format!("    {}. {}", i + 1, stage));
            }
        }
        lines.join("\n")
    }
}

impl Serialize for StagePlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Phases<'a>(&'a [(Phase, Vec<Stage>)]);

        impl Serialize for Phases<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (phase, stages) in self.0 {
                    map.serialize_entry(&phase.to_string(), stages)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("pipeline", &self.pipeline)?;
        map.serialize_entry("stages", &Phases(&self.phases))?;
        map.end()
    }
}

/// On-disk shape shared by persisted plans and extension fragments.
///
/// Phase keys stay strings here so unknown ones can be reported instead of
/// failing the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pipeline: Option<Pipeline>,
    #[serde(default)]
    pub stages: BTreeMap<String, Vec<Stage>>,
}

// ============================================================================
// Serde helpers
// ============================================================================

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn default_file_mode() -> u32 {
    0o644
}

fn default_dir_mode() -> u32 {
    0o755
}

/// File modes as octal strings (`"0644"`); integers are accepted on input.
mod octal_mode {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:04o}", mode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        struct ModeVisitor;

        impl Visitor<'_> for ModeVisitor {
            type Value = u32;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an octal mode string such as \"0644\" or an integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
                u32::try_from(v)
                    .ok()
                    .filter(|m| *m <= 0o7777)
                    .ok_or_else(|| E::custom(format!("mode {} out of range", v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("mode {} out of range", v)))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<u32, E> {
                let digits = v.trim().trim_start_matches("0o");
                u32::from_str_radix(digits, 8)
                    .ok()
                    .filter(|m| *m <= 0o7777)
                    .ok_or_else(|| E::custom(format!("invalid octal mode '{}'", v)))
            }
        }

        deserializer.deserialize_any(ModeVisitor)
    }
}

// ============================================================================
// Tests
// ============================================================================
