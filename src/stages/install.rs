//! Install-pipeline generators: repositories, base packages, branding and
//! OEM cloud-configs.

use super::{PlanContext, StageGenerator};
use crate::assets;
use crate::logic::template::render_text;
use crate::plan::Stage;
use crate::types::{Family, Phase};
use anyhow::{Context, Result};
use serde::Serialize;

// ============================================================================
// before-install
// ============================================================================

/// Package repository setup, one predicate-gated stage per family.
pub struct Repositories;

impl StageGenerator for Repositories {
    fn name(&self) -> &'static str {
        "repositories"
    }

    fn phase(&self) -> Phase {
        Phase::BeforeInstall
    }

    fn generate(&self, _ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        Ok(vec![
            Stage::builder("Configure apt")
                .only_families(&[Family::Debian])
                .file(
                    "/etc/apt/apt.conf.d/99-osplan",
                    "APT::Install-Recommends \"false\";\nAPT::Install-Suggests \"false\";\n",
                    0o644,
                )
                .env("DEBIAN_FRONTEND", "noninteractive")
                .environment_file("/etc/environment")
                .build(),
            Stage::builder("Enable EPEL")
                .only_families(&[Family::RedHat])
                .only_if("! grep -qi fedora /etc/os-release")
                .refresh()
                .install(["epel-release"])
                .build(),
            Stage::builder("Enable community repository")
                .only_families(&[Family::Alpine])
                .command(r"sed -i -e 's/^#\(.*\/community\)$/\1/' /etc/apk/repositories")
                .build(),
            Stage::builder("Refresh zypper repositories")
                .only_families(&[Family::Suse])
                .command("zypper --non-interactive --gpg-auto-import-keys refresh")
                .build(),
        ])
    }
}

// ============================================================================
// install
// ============================================================================

/// Installs the resolved package list.
pub struct BasePackages;

impl StageGenerator for BasePackages {
    fn name(&self) -> &'static str {
        "base-packages"
    }

    fn phase(&self) -> Phase {
        Phase::Install
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        Ok(vec![
            Stage::builder("Install base packages")
                .refresh()
                .install(ctx.packages.iter().cloned())
                .build(),
        ])
    }
}

// ============================================================================
// after-install
// ============================================================================

#[derive(Serialize)]
struct BrandingContext<'a> {
    name: &'a str,
    version: &'a str,
    distro: String,
}

/// Login banners.
pub struct Branding;

impl StageGenerator for Branding {
    fn name(&self) -> &'static str {
        "branding"
    }

    fn phase(&self) -> Phase {
        Phase::AfterInstall
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let context = BrandingContext {
            name: &ctx.config.image_name,
            version: &ctx.config.image_version,
            distro: ctx.system.distro.to_string(),
        };

        let mut stage = Stage::builder("Branding");
        for (asset, path) in [(assets::MOTD, "/etc/motd"), (assets::ISSUE, "/etc/issue")] {
            let body = ctx
                .assets
                .get(asset)
                .with_context(|| format!("Failed to load branding asset {}", asset))?;
            let rendered = render_text(asset, &body, &context)?;
            stage = stage.file(path, rendered, 0o644);
        }
        Ok(vec![stage.build()])
    }
}

/// Default cloud-configs shipped in the OEM directory.
pub struct OemConfigs;

const OEM_DIR: &str = "/system/oem";

impl StageGenerator for OemConfigs {
    fn name(&self) -> &'static str {
        "oem-configs"
    }

    fn phase(&self) -> Phase {
        Phase::AfterInstall
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let mut stage = Stage::builder("Default cloud-configs").directory(OEM_DIR, 0o755);
        for asset in [assets::CLOUD_CONFIG_NETWORK, assets::CLOUD_CONFIG_ACCOUNTS] {
            let body = ctx
                .assets
                .get(asset)
                .with_context(|| format!("Failed to load cloud-config {}", asset))?;
            let file_name = asset.rsplit('/').next().unwrap_or(asset);
            stage = stage.file(format!("{}/{}", OEM_DIR, file_name), body, 0o600);
        }
        Ok(vec![stage.build()])
    }
}
