//! Type-safe identifiers for OS targets, build options and plan phases.
//!
//! Every axis the resolver and composer branch on is an enum here, so that
//! distro/family/architecture matching is exhaustive instead of stringly
//! typed. The `Display`/`FromStr` spellings are the ones used in os-release
//! data, CLI flags, template parameters and serialized plans.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A specific OS identity, as reported by the os-release `ID` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Distro {
    Ubuntu,
    Debian,
    Fedora,
    Rhel,
    #[strum(serialize = "rockylinux")]
    #[serde(rename = "rockylinux")]
    RockyLinux,
    #[strum(serialize = "almalinux")]
    #[serde(rename = "almalinux")]
    AlmaLinux,
    Centos,
    Alpine,
    OpensuseLeap,
    OpensuseTumbleweed,
    Sles,
    Arch,
    #[default]
    Unknown,
}

/// OS lineage sharing packaging conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Family {
    Debian,
    #[strum(serialize = "redhat")]
    RedHat,
    Alpine,
    Suse,
    Arch,
    #[default]
    Unknown,
}

impl Family {
    /// Returns true for families whose images boot with systemd.
    pub fn uses_systemd(self) -> bool {
        matches!(self, Self::Debian | Self::RedHat | Self::Suse | Self::Arch)
    }

    /// Returns true for families whose images boot with OpenRC.
    pub fn uses_openrc(self) -> bool {
        matches!(self, Self::Alpine)
    }
}

/// Supported CPU architectures. Anything else resolves to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
    #[default]
    Unknown,
}

impl Architecture {
    /// Map a kernel/toolchain machine name (`x86_64`, `aarch64`, ...) to a
    /// supported architecture.
    pub fn from_machine(machine: &str) -> Self {
        match machine.trim() {
            "x86_64" | "amd64" => Self::Amd64,
            "aarch64" | "arm64" => Self::Arm64,
            _ => Self::Unknown,
        }
    }
}

/// Image variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Variant {
    /// Immutable base image without a kubernetes provider
    #[default]
    Core,
    /// Base image plus a kubernetes provider
    Standard,
}

/// Kubernetes provider bundled into standard images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    #[default]
    None,
    K3s,
    K0s,
}

/// Target hardware model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Model {
    #[default]
    Generic,
    Rpi3,
    Rpi4,
    NvidiaAgxOrin,
}

impl Model {
    /// Board models only ship arm64 images.
    pub fn is_board(self) -> bool {
        !matches!(self, Self::Generic)
    }
}

/// Which pipelines a plan covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Pipeline {
    Install,
    Init,
    #[default]
    All,
}

impl Pipeline {
    /// Phases covered by this pipeline selection, in execution order.
    pub fn phases(self) -> &'static [Phase] {
        match self {
            Self::Install => &[Phase::BeforeInstall, Phase::Install, Phase::AfterInstall],
            Self::Init => &[Phase::BeforeInit, Phase::Init, Phase::AfterInit],
            Self::All => &Phase::ALL,
        }
    }
}

/// Fixed-position step of a provisioning pipeline.
///
/// The derived ordering is the execution order: every install-pipeline phase
/// sorts before every init-pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    BeforeInstall,
    Install,
    AfterInstall,
    BeforeInit,
    Init,
    AfterInit,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::BeforeInstall,
        Phase::Install,
        Phase::AfterInstall,
        Phase::BeforeInit,
        Phase::Init,
        Phase::AfterInit,
    ];

    /// The pipeline this phase belongs to (never `Pipeline::All`).
    pub fn pipeline(self) -> Pipeline {
        match self {
            Self::BeforeInstall | Self::Install | Self::AfterInstall => Pipeline::Install,
            Self::BeforeInit | Self::Init | Self::AfterInit => Pipeline::Init,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_phase_spelling() {
        assert_eq!(Phase::BeforeInstall.to_string(), "before-install");
        assert_eq!(Phase::AfterInit.to_string(), "after-init");
        assert_eq!(Phase::from_str("before-init").unwrap(), Phase::BeforeInit);
        assert!(Phase::from_str("boot").is_err());
    }

    #[test]
    fn test_phase_ordering_matches_declaration() {
        let phases: Vec<Phase> = Phase::iter().collect();
        assert_eq!(phases, Phase::ALL.to_vec());
        assert!(Phase::AfterInstall < Phase::BeforeInit);
    }

    #[test]
    fn test_pipeline_phases() {
        assert_eq!(Pipeline::Install.phases().len(), 3);
        assert_eq!(Pipeline::Init.phases()[0], Phase::BeforeInit);
        assert_eq!(Pipeline::All.phases(), &Phase::ALL);
        for phase in Pipeline::Init.phases() {
            assert_eq!(phase.pipeline(), Pipeline::Init);
        }
    }

    #[test]
    fn test_distro_spelling() {
        assert_eq!(Distro::RockyLinux.to_string(), "rockylinux");
        assert_eq!(Distro::OpensuseLeap.to_string(), "opensuse-leap");
        assert_eq!(Distro::from_str("almalinux").unwrap(), Distro::AlmaLinux);
        assert_eq!(Family::RedHat.to_string(), "redhat");
    }

    #[test]
    fn test_architecture_from_machine() {
        assert_eq!(Architecture::from_machine("x86_64"), Architecture::Amd64);
        assert_eq!(Architecture::from_machine("aarch64"), Architecture::Arm64);
        assert_eq!(Architecture::from_machine("riscv64"), Architecture::Unknown);
        assert_eq!(Architecture::from_machine(""), Architecture::Unknown);
    }

    #[test]
    fn test_family_init_systems() {
        assert!(Family::Debian.uses_systemd());
        assert!(Family::Alpine.uses_openrc());
        assert!(!Family::Unknown.uses_systemd());
        assert!(!Family::Unknown.uses_openrc());
    }

    #[test]
    fn test_serde_uses_display_spelling() {
        let json = serde_json::to_string(&Phase::AfterInstall).unwrap();
        assert_eq!(json, "\"after-install\"");
        let parsed: Distro = serde_json::from_str("\"rockylinux\"").unwrap();
        assert_eq!(parsed, Distro::RockyLinux);
    }

    #[test]
    fn test_all_enums_have_default() {
        assert_eq!(Distro::default(), Distro::Unknown);
        assert_eq!(Family::default(), Family::Unknown);
        assert_eq!(Architecture::default(), Architecture::Unknown);
        assert_eq!(Variant::default(), Variant::Core);
        assert_eq!(Provider::default(), Provider::None);
        assert_eq!(Pipeline::default(), Pipeline::All);
    }
}
