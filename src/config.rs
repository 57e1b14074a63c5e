//! Startup configuration.
//!
//! [`RunConfig`] is built once from CLI flags and environment before any
//! resolution happens, validated, and then passed by reference into every
//! resolver and composer call. Nothing mutates it afterwards, which is what
//! makes planning safe to run from several callers at once.

use crate::error::ConfigError;
use crate::system::SystemDescriptor;
use crate::types::{Architecture, Model, Pipeline, Provider, Variant};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment override for the numbered fragment directory
pub const EXTENSIONS_DIR_ENV: &str = "OSPLAN_EXTENSIONS_DIR";

/// Environment override for the stage-extension directory
pub const STAGE_EXTENSIONS_DIR_ENV: &str = "OSPLAN_STAGE_EXTENSIONS_DIR";

pub const DEFAULT_EXTENSIONS_DIR: &str = "/etc/osplan/extensions";
pub const DEFAULT_STAGE_EXTENSIONS_DIR: &str = "/etc/osplan/stage-extensions";

/// Where serialized plans are written
pub const DEFAULT_OUTPUT_DIR: &str = "/etc/osplan";

/// Immutable configuration for one planning invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub pipeline: Pipeline,
    pub variant: Variant,
    pub model: Model,
    pub provider: Provider,
    /// Kubernetes version pinned for the provider (latest when absent)
    pub k8s_version: Option<String>,
    /// Version stamped into the release metadata (e.g. `v3.2.1`)
    pub image_version: String,
    /// Branding name used in release metadata and boot menus
    pub image_name: String,
    /// Pre-signed image mode: no initrd rebuild, no grub
    pub trusted_boot: bool,
    pub fips: bool,
    pub extensions_dir: PathBuf,
    pub stage_extensions_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pipeline: Pipeline::All,
            variant: Variant::Core,
            model: Model::Generic,
            provider: Provider::None,
            k8s_version: None,
            image_version: "v0.0.1".to_string(),
            image_name: "osplan".to_string(),
            trusted_boot: false,
            fips: false,
            extensions_dir: PathBuf::from(DEFAULT_EXTENSIONS_DIR),
            stage_extensions_dir: PathBuf::from(DEFAULT_STAGE_EXTENSIONS_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl RunConfig {
    /// Extension directories from the environment, falling back to defaults.
    pub fn extension_dirs_from_env() -> (PathBuf, PathBuf) {
        let dir = |var: &str, default: &str| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        (
            dir(EXTENSIONS_DIR_ENV, DEFAULT_EXTENSIONS_DIR),
            dir(STAGE_EXTENSIONS_DIR_ENV, DEFAULT_STAGE_EXTENSIONS_DIR),
        )
    }

    /// Validate flag combinations. Called once at startup; any error here is
    /// fatal before resolution begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_semver("version", &self.image_version)?;

        if self.image_name.trim().is_empty() {
            return Err(ConfigError::invalid("name", &self.image_name, "must not be empty"));
        }

        match (self.variant, self.provider) {
            (Variant::Core, Provider::None) | (Variant::Standard, Provider::K3s | Provider::K0s) => {}
            (Variant::Core, provider) => {
                return Err(ConfigError::conflict(format!(
                    "provider '{}' requires the standard variant",
                    provider
                )));
            }
            (Variant::Standard, Provider::None) => {
                return Err(ConfigError::conflict(
                    "the standard variant requires a kubernetes provider",
                ));
            }
        }

        if let Some(k8s) = &self.k8s_version {
            if self.provider == Provider::None {
                return Err(ConfigError::conflict(
                    "a kubernetes version was given without a provider",
                ));
            }
            parse_semver("k8s-version", k8s)?;
        }

        if self.trusted_boot && self.model.is_board() {
            return Err(ConfigError::conflict(format!(
                "trusted boot is not supported on model '{}'",
                self.model
            )));
        }

        Ok(())
    }

    /// Validate the configuration against the detected target.
    pub fn check_target(&self, system: &SystemDescriptor) -> Result<(), ConfigError> {
        if self.model.is_board() && system.arch != Architecture::Arm64 {
            return Err(ConfigError::conflict(format!(
                "model '{}' requires an arm64 system, detected {}",
                self.model, system.arch
            )));
        }
        Ok(())
    }

    /// Path the serialized plan for `pipeline` is written to.
    pub fn plan_path(&self, pipeline: Pipeline) -> PathBuf {
        self.output_dir.join(format!("osplan-{}.yaml", pipeline))
    }
}

/// Parse a release version, tolerating a leading `v`.
pub fn parse_semver(field: &'static str, value: &str) -> Result<semver::Version, ConfigError> {
    let trimmed = value.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    semver::Version::parse(bare).map_err(|e| ConfigError::invalid(field, value, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_image_version() {
        let config = RunConfig {
            image_version: "latest".into(),
            ..RunConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "version", .. }));
    }

    #[test]
    fn test_version_accepts_v_prefix() {
        assert_eq!(parse_semver("version", "v3.2.1").unwrap(), semver::Version::new(3, 2, 1));
        assert!(parse_semver("version", "3.2").is_err());
    }

    #[test]
    fn test_provider_requires_standard() {
        let config = RunConfig {
            provider: Provider::K3s,
            ..RunConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Conflict(_))));
    }

    #[test]
    fn test_standard_requires_provider() {
        let config = RunConfig {
            variant: Variant::Standard,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfig {
            variant: Variant::Standard,
            provider: Provider::K0s,
            k8s_version: Some("v1.30.2".into()),
            ..RunConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_k8s_version_must_parse() {
        let config = RunConfig {
            variant: Variant::Standard,
            provider: Provider::K3s,
            k8s_version: Some("1.30".into()),
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trusted_boot_rejected_on_boards() {
        let config = RunConfig {
            trusted_boot: true,
            model: Model::Rpi4,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_board_requires_arm64() {
        let config = RunConfig {
            model: Model::Rpi4,
            ..RunConfig::default()
        };
        let mut system = SystemDescriptor::unknown();
        system.arch = Architecture::Amd64;
        assert!(config.check_target(&system).is_err());
        system.arch = Architecture::Arm64;
        assert!(config.check_target(&system).is_ok());
    }

    #[test]
    fn test_plan_path() {
        let config = RunConfig::default();
        assert_eq!(
            config.plan_path(Pipeline::Init),
            PathBuf::from("/etc/osplan/osplan-init.yaml")
        );
    }
}
