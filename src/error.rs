//! Error handling module for osplan
//!
//! Three failure classes exist:
//!
//! - **Configuration errors** ([`ConfigError`]): invalid startup flags, fatal
//!   before any resolution happens.
//! - **Resolution errors** ([`PlanError`]): version parsing, template
//!   substitution and stage generator failures. Always tagged with the phase
//!   that was being resolved; no partial plan is returned.
//! - **Advisory conditions**: logged with `tracing::warn!` and skipped. They
//!   never surface as an error value.

use crate::types::Phase;
use thiserror::Error;

/// Version text that could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The descriptor's own version is not a usable version number
    #[error("cannot parse system version '{version}': {reason}")]
    System { version: String, reason: String },

    /// A matrix key is neither `common` nor a valid range expression
    #[error("cannot parse version constraint '{constraint}': {reason}")]
    Constraint { constraint: String, reason: String },
}

/// Package-name template that could not be rendered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot render package template '{template}': {reason}")]
pub struct TemplateError {
    pub template: String,
    pub reason: String,
}

/// Invalid startup configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Conflict(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

/// Failure while resolving packages or composing a stage plan.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Package resolution failed while building the given phase
    #[error("phase {phase}: package resolution failed")]
    Resolve {
        phase: Phase,
        #[source]
        source: ResolveError,
    },

    /// A built-in stage generator failed
    #[error("phase {phase}: stage generator '{generator}' failed")]
    Generator {
        phase: Phase,
        generator: String,
        #[source]
        source: anyhow::Error,
    },

    /// The execution collaborator failed while running a phase
    #[error("phase {phase}: execution failed")]
    Execute {
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },

    /// Plan could not be persisted or read back
    #[error("cannot access plan file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Plan could not be serialized
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl PlanError {
    /// Phase the failure belongs to, when there is one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Resolve { phase, .. }
            | Self::Generator { phase, .. }
            | Self::Execute { phase, .. } => Some(*phase),
            Self::Io { .. } | Self::Yaml(_) => None,
        }
    }
}

/// Fatal package-resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Result type alias for plan operations
pub type Result<T> = std::result::Result<T, PlanError>;
