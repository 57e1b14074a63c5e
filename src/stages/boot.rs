//! Boot-chain generators.
//!
//! Two disjoint branches:
//!
//! | Legacy (grub) | Trusted (pre-signed UKI) |
//! |---------------|--------------------------|
//! | [`GrubBootArgs`] | [`UkiCmdline`] |
//! | [`InitrdRebuild`] | [`InitrdRemoval`] |
//!
//! [`KernelLink`] runs in both.

use super::{BootCategory, PlanContext, StageGenerator};
use crate::assets;
use crate::plan::Stage;
use crate::probe::latest_kernel;
use crate::system::SystemDescriptor;
use crate::types::{Family, Phase};
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

const FIPS_ARGS: &str = "fips=1";

/// Picks the newest kernel release at run time, skipping non-release dirs
/// such as `extramodules`.
const NEWEST_KERNEL: &str =
    "kernel=$(ls -1 /lib/modules | grep '^[0-9]' | sort -V | tail -n 1) && [ -n \"$kernel\" ]";

/// Kernel the init stages operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KernelSelection {
    /// Found in the target root while composing.
    Pinned(String),
    /// Resolved by the stage itself from `/lib/modules` when it runs.
    Newest,
}

impl KernelSelection {
    /// A plan that still has to run its install phases cannot know the
    /// kernel yet, so it always defers. Otherwise the probe decides, and an
    /// empty target defers too.
    fn for_plan(ctx: &PlanContext<'_>) -> Result<Self> {
        if ctx.config.pipeline.phases().contains(&Phase::Install) {
            debug!("install phases precede init, kernel is selected at run time");
            return Ok(Self::Newest);
        }
        let kernels = ctx
            .probe
            .installed_kernels()
            .context("Failed to probe installed kernels")?;
        match latest_kernel(&kernels) {
            Some(release) => {
                info!("selected kernel {}", release);
                Ok(Self::Pinned(release.to_string()))
            }
            None => {
                warn!("no kernel found in the target root, selecting it at run time");
                Ok(Self::Newest)
            }
        }
    }

    /// Shell text standing for the release inside a command.
    fn release(&self) -> &str {
        match self {
            Self::Pinned(release) => release.as_str(),
            Self::Newest => "$kernel",
        }
    }

    /// Join the commands into one shell line behind the selection prelude
    /// when the release is only known at run time.
    fn commands(&self, commands: Vec<String>) -> Vec<String> {
        match self {
            Self::Pinned(_) => commands,
            Self::Newest => {
                let mut line = NEWEST_KERNEL.to_string();
                for command in commands {
                    line.push_str(" && ");
                    line.push_str(&command);
                }
                vec![line]
            }
        }
    }
}

/// Where the distro puts the kernel image for a given release.
fn kernel_image(system: &SystemDescriptor, selection: &KernelSelection) -> String {
    let release = selection.release();
    match system.family {
        // Alpine names the image after the flavor: vmlinuz-lts, vmlinuz-virt
        Family::Alpine => match selection {
            KernelSelection::Pinned(release) => {
                let flavor = release.rsplit('-').next().unwrap_or(release.as_str());
                format!("/boot/vmlinuz-{}", flavor)
            }
            KernelSelection::Newest => "/boot/vmlinuz-${kernel##*-}".to_string(),
        },
        Family::RedHat | Family::Suse => format!("/lib/modules/{}/vmlinuz", release),
        _ => format!("/boot/vmlinuz-{}", release),
    }
}

// ============================================================================
// after-install
// ============================================================================

/// Grub boot arguments file.
pub struct GrubBootArgs;

impl StageGenerator for GrubBootArgs {
    fn name(&self) -> &'static str {
        "grub-bootargs"
    }

    fn phase(&self) -> Phase {
        Phase::AfterInstall
    }

    fn category(&self) -> BootCategory {
        BootCategory::Legacy
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let mut body = ctx
            .assets
            .get(assets::GRUB_BOOTARGS)
            .context("Failed to load grub boot arguments")?;
        if ctx.config.fips {
            body.push_str(&format!("set extraArgs=\"{}\"\n", FIPS_ARGS));
        }
        if ctx.config.model.is_board() {
            body.push_str("set extraConsole=\"console=ttyAMA0,115200\"\n");
        }
        Ok(vec![
            Stage::builder("Grub boot arguments")
                .directory("/etc/osplan", 0o755)
                .file("/etc/osplan/bootargs.cfg", body, 0o644)
                .build(),
        ])
    }
}

/// Default kernel command line baked into the unified kernel image.
pub struct UkiCmdline;

impl StageGenerator for UkiCmdline {
    fn name(&self) -> &'static str {
        "uki-cmdline"
    }

    fn phase(&self) -> Phase {
        Phase::AfterInstall
    }

    fn category(&self) -> BootCategory {
        BootCategory::Trusted
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let body = ctx
            .assets
            .get(assets::UKI_CMDLINE)
            .context("Failed to load UKI command line")?;
        let mut cmdline = body.trim_end().to_string();
        if ctx.config.fips {
            cmdline.push(' ');
            cmdline.push_str(FIPS_ARGS);
        }
        cmdline.push('\n');
        Ok(vec![
            Stage::builder("UKI command line")
                .directory("/etc/kernel", 0o755)
                .file("/etc/kernel/cmdline", cmdline, 0o644)
                .build(),
        ])
    }
}

// ============================================================================
// init
// ============================================================================

/// Points `/boot/vmlinuz` at the newest installed kernel.
pub struct KernelLink;

impl StageGenerator for KernelLink {
    fn name(&self) -> &'static str {
        "kernel"
    }

    fn phase(&self) -> Phase {
        Phase::Init
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let selection = KernelSelection::for_plan(ctx)?;
        let image = kernel_image(ctx.system, &selection);
        let link = format!("ln -sf {} /boot/vmlinuz", image);
        let stage = match &selection {
            KernelSelection::Pinned(release) => Stage::builder(format!("Link kernel {}", release))
                .env("KERNEL_VERSION", release.clone()),
            KernelSelection::Newest => Stage::builder("Link newest kernel"),
        };
        Ok(vec![stage.commands(selection.commands(vec![link])).build()])
    }
}

/// Regenerates the initrd for the selected kernel.
pub struct InitrdRebuild;

impl StageGenerator for InitrdRebuild {
    fn name(&self) -> &'static str {
        "initrd"
    }

    fn phase(&self) -> Phase {
        Phase::Init
    }

    fn category(&self) -> BootCategory {
        BootCategory::Legacy
    }

    fn generate(&self, ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        let selection = KernelSelection::for_plan(ctx)?;
        let release = selection.release();
        let initrd = format!("/boot/initrd-{}", release);
        let fips = if ctx.config.fips { " -a fips" } else { "" };
        let commands = vec![
            format!("dracut -f{} {} {}", fips, initrd, release),
            format!("ln -sf {} /boot/initrd", initrd),
        ];
        Ok(vec![
            Stage::builder("Rebuild initrd")
                .commands(selection.commands(commands))
                .build(),
        ])
    }
}

/// Pre-signed images boot without a separate initrd.
pub struct InitrdRemoval;

impl StageGenerator for InitrdRemoval {
    fn name(&self) -> &'static str {
        "initrd-removal"
    }

    fn phase(&self) -> Phase {
        Phase::Init
    }

    fn category(&self) -> BootCategory {
        BootCategory::Trusted
    }

    fn generate(&self, _ctx: &PlanContext<'_>) -> Result<Vec<Stage>> {
        Ok(vec![
            Stage::builder("Remove initrd")
                .commands(["rm -f /boot/initrd*", "rm -f /boot/initramfs*"])
                .build(),
        ])
    }
}
