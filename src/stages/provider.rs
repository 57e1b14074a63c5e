//! Kubernetes provider install for the standard variant.

use super::{PlanContext, StageGenerator};
use crate::plan::Stage;
use crate::types::{Family, Phase, Provider, Variant};
use anyhow::{bail, Result};
use tracing::debug;

const K3S_INSTALLER: &str = "https://get.k3s.io";
const K0S_INSTALLER: &str = "https://get.k0s.sh";

pub struct ProviderInstall;

impl StageGenerator for ProviderInstall {
    fn name(&self) -> &'static str {
        "provider"
    }

    fn phase(&self) -> Phase {
        Phase::Install
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let config = ctx.config;
        if config.variant != Variant::Standard {
            debug!("core variant: no provider stages");
            return Ok(Vec::new());
        }

        let version = config.k8s_version.as_deref();
        let stage = match config.provider {
            Provider::None => bail!("standard variant requires a provider"),
            Provider::K3s => {
                let mut env = vec![
                    "INSTALL_K3S_SKIP_ENABLE=true".to_string(),
                    "INSTALL_K3S_SKIP_START=true".to_string(),
                    "INSTALL_K3S_SKIP_SELINUX_RPM=true".to_string(),
                ];
                if let Some(v) = version {
                    env.push(format!("INSTALL_K3S_VERSION={}", v));
                }
                let mut builder = Stage::builder("Install k3s").command(format!(
                    "curl -sfL {} | {} sh -",
                    K3S_INSTALLER,
                    env.join(" ")
                ));
                // The installer only writes a systemd unit.
                if ctx.system.family == Family::Alpine {
                    builder = builder.command("rc-update add k3s default || true");
                }
                builder.build()
            }
            Provider::K0s => {
                let prefix = version
                    .map(|v| format!("K0S_VERSION={} ", v))
                    .unwrap_or_default();
                Stage::builder("Install k0s")
                    .command(format!("curl -sSLf {} | {}sh", K0S_INSTALLER, prefix))
                    .directory("/var/lib/k0s", 0o755)
                    .build()
            }
        };
        Ok(vec![stage])
    }
}
