//! Init-pipeline generators: workarounds, release metadata, services and
//! cleanup.

use super::{PlanContext, StageGenerator};
use crate::assets;
use crate::plan::Stage;
use crate::types::{Family, Phase, Provider};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::debug;

pub const RELEASE_FILE: &str = "/etc/osplan-release";
pub const ENV_FILE: &str = "/etc/osplan/osplan.env";

const SYSTEMD_FAMILIES: &[Family] = &[Family::Debian, Family::RedHat, Family::Suse, Family::Arch];

// ============================================================================
// before-init
// ============================================================================

/// Strips host identity left behind by package installs.
pub struct Workarounds;

impl StageGenerator for Workarounds {
    fn name(&self) -> &'static str {
        "workarounds"
    }

    fn phase(&self) -> Phase {
        Phase::BeforeInit
    }

    fn generate(&self, _ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        Ok(vec![
            Stage::builder("Reset host identity")
                .commands([
                    "rm -f /etc/hostname",
                    "rm -f /etc/ssh/ssh_host_*",
                    "rm -f /var/lib/dbus/machine-id",
                ])
                .build(),
            Stage::builder("Disable first-boot wizard")
                .only_families(SYSTEMD_FAMILIES)
                .mask(["systemd-firstboot.service"])
                .build(),
        ])
    }
}

// ============================================================================
// init
// ============================================================================

/// `/etc/osplan-release` plus the service environment file.
pub struct ReleaseMetadata;

impl ReleaseMetadata {
    fn fields(ctx: &PlanContext<'_>) -> BTreeMap<&'static str, String> {
        let config = ctx.config;
        let system = ctx.system;
        let mut fields = BTreeMap::new();
        fields.insert("OSPLAN_NAME", config.image_name.clone());
        fields.insert("OSPLAN_VERSION", config.image_version.clone());
        fields.insert(
            "OSPLAN_ID",
            format!("{}-{}-{}", config.image_name, system.distro, config.image_version),
        );
        fields.insert("OSPLAN_FAMILY", system.family.to_string());
        fields.insert("OSPLAN_FLAVOR", system.distro.to_string());
        fields.insert("OSPLAN_FLAVOR_RELEASE", system.version.clone());
        fields.insert("OSPLAN_ARCH", system.arch.to_string());
        fields.insert("OSPLAN_MODEL", config.model.to_string());
        fields.insert("OSPLAN_VARIANT", config.variant.to_string());
        fields.insert("OSPLAN_TRUSTED_BOOT", config.trusted_boot.to_string());
        fields.insert("OSPLAN_FIPS", config.fips.to_string());
        if config.provider != Provider::None {
            fields.insert("OSPLAN_PROVIDER", config.provider.to_string());
        }
        if let Some(k8s) = &config.k8s_version {
            fields.insert("OSPLAN_K8S_VERSION", k8s.clone());
        }
        fields
    }
}

impl StageGenerator for ReleaseMetadata {
    fn name(&self) -> &'static str {
        "release"
    }

    fn phase(&self) -> Phase {
        Phase::Init
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let mut release = Stage::builder("Release metadata").environment_file(RELEASE_FILE);
        for (key, value) in Self::fields(ctx) {
            release = release.env(key, value);
        }

        let env = ctx
            .assets
            .get(assets::SERVICE_ENV)
            .context("Failed to load service environment")?;

        Ok(vec![
            release.build(),
            Stage::builder("Service environment")
                .directory("/etc/osplan", 0o755)
                .file(ENV_FILE, env, 0o644)
                .build(),
        ])
    }
}

/// Enables the services every image needs.
pub struct Services;

impl StageGenerator for Services {
    fn name(&self) -> &'static str {
        "services"
    }

    fn phase(&self) -> Phase {
        Phase::Init
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let family = ctx.system.family;
        let stage = if family.uses_systemd() {
            let ssh = if family == Family::Debian { "ssh" } else { "sshd" };
            let mut builder = Stage::builder("Enable services")
                .enable([ssh, "systemd-networkd", "systemd-timesyncd"]);
            if family == Family::Debian {
                builder = builder.disable(["apt-daily.timer", "apt-daily-upgrade.timer"]);
            }
            builder.build()
        } else if family.uses_openrc() {
            Stage::builder("Enable services")
                .enable(["sshd", "networking", "chronyd"])
                .build()
        } else {
            debug!("no init system known for family {}, skipping services", family);
            return Ok(Vec::new());
        };
        Ok(vec![stage])
    }
}

// ============================================================================
// after-init
// ============================================================================

/// Package caches, logs and the machine-id.
pub struct Cleanup;

impl StageGenerator for Cleanup {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn phase(&self) -> Phase {
        Phase::AfterInit
    }

    fn generate(&self, _ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let caches: [(Family, &[&str]); 5] = [
            (Family::Debian, &["apt-get clean", "rm -rf /var/lib/apt/lists/*"]),
            (Family::RedHat, &["dnf clean all"]),
            (Family::Suse, &["zypper clean --all"]),
            (Family::Alpine, &["rm -rf /var/cache/apk/*"]),
            (Family::Arch, &["pacman -Scc --noconfirm"]),
        ];

        let mut stages: Vec<Stage> = caches
            .into_iter()
            .map(|(family, commands)| {
                Stage::builder(format!("Clean {} package cache", family))
                    .only_families(&[family])
                    .commands(commands.iter().copied())
                    .build()
            })
            .collect();

        stages.push(
            Stage::builder("Clean logs and machine-id")
                .commands([
                    "find /var/log -type f -delete",
                    "rm -rf /tmp/* /var/tmp/*",
                    "truncate -s 0 /etc/machine-id",
                ])
                .build(),
        );
        Ok(stages)
    }
}
