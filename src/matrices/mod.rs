//! Built-in package matrices.
//!
//! Package lists are kept in Rust rather than in data files so that a typo
//! in a table shows up as a test failure, and so that every image built from
//! the same binary resolves the same packages.
//!
//! # Tables
//!
//! | Table | Selected when |
//! |-------|---------------|
//! | [`COMMON_PACKAGES`] | always, as the list prefix |
//! | [`base`] | always |
//! | [`kernel`] | always |
//! | [`grub`] | legacy (non-trusted) boot |
//! | [`trusted_boot`] | trusted boot |
//! | [`fips`] | FIPS mode |
//!
//! The grub and trusted-boot tables are never selected together.
//!
//! The tables are built once on first use and are read-only afterwards.

use crate::config::RunConfig;
use crate::logic::matrix::{ArchAxis, PackageMatrix, Target, VersionMap};
use crate::types::{Architecture, Distro, Family};
use std::sync::LazyLock;

/// Distro-neutral packages every image gets.
pub const COMMON_PACKAGES: &[&str] = &[
    "curl",
    "file",
    "gawk",
    "iptables",
    "less",
    "nano",
    "rsync",
    "sudo",
    "tar",
    "zstd",
];

static BASE: LazyLock<PackageMatrix> = LazyLock::new(build_base);
static KERNEL: LazyLock<PackageMatrix> = LazyLock::new(build_kernel);
static GRUB: LazyLock<PackageMatrix> = LazyLock::new(build_grub);
static TRUSTED_BOOT: LazyLock<PackageMatrix> = LazyLock::new(build_trusted_boot);
static FIPS: LazyLock<PackageMatrix> = LazyLock::new(build_fips);

pub fn base() -> &'static PackageMatrix {
    &BASE
}

pub fn kernel() -> &'static PackageMatrix {
    &KERNEL
}

pub fn grub() -> &'static PackageMatrix {
    &GRUB
}

pub fn trusted_boot() -> &'static PackageMatrix {
    &TRUSTED_BOOT
}

pub fn fips() -> &'static PackageMatrix {
    &FIPS
}

/// Matrices applicable to a configuration, in resolution order.
pub fn select(config: &RunConfig) -> Vec<&'static PackageMatrix> {
    let mut matrices = vec![base(), kernel()];
    if config.trusted_boot {
        matrices.push(trusted_boot());
    } else {
        matrices.push(grub());
    }
    if config.fips {
        matrices.push(fips());
    }
    matrices
}

// ============================================================================
// Table definitions
// ============================================================================

fn build_base() -> PackageMatrix {
    PackageMatrix::new("base")
        .family(
            Family::Debian,
            VersionMap::common(&[
                "systemd",
                "systemd-timesyncd",
                "dbus",
                "openssh-server",
                "iproute2",
                "ca-certificates",
                "conntrack",
                "cloud-guest-utils",
                "dosfstools",
                "e2fsprogs",
                "fdisk",
                "gdisk",
                "parted",
                "lvm2",
                "cryptsetup",
                "squashfs-tools",
                "dracut",
                "dracut-network",
                "haveged",
                "jq",
            ]),
        )
        .distro(
            Distro::Ubuntu,
            VersionMap::new()
                .entry("common", &["ubuntu-keyring", "netplan.io"])
                .entry(">=22.04", &["systemd-resolved"])
                .entry(">=24.04", &["dracut-live"])
                .entry("<22.04", &["dracut-core"]),
        )
        .distro(
            Distro::Debian,
            VersionMap::new()
                .entry("common", &["debian-archive-keyring"])
                .entry(">=12", &["systemd-resolved", "dracut-live"]),
        )
        .family(
            Family::RedHat,
            VersionMap::common(&[
                "systemd",
                "systemd-networkd",
                "openssh-server",
                "iproute",
                "ca-certificates",
                "conntrack-tools",
                "cloud-utils-growpart",
                "dosfstools",
                "e2fsprogs",
                "gdisk",
                "parted",
                "lvm2",
                "cryptsetup",
                "squashfs-tools",
                "dracut",
                "dracut-live",
                "dracut-network",
                "jq",
            ]),
        )
        .distro(
            Distro::Fedora,
            VersionMap::new().entry(">=39", &["systemd-resolved"]),
        )
        .distro(
            Distro::RockyLinux,
            VersionMap::new()
                .entry("common", &["epel-release"])
                .entry(">=9", &["systemd-resolved"]),
        )
        .distro(
            Distro::AlmaLinux,
            VersionMap::new()
                .entry("common", &["epel-release"])
                .entry(">=9", &["systemd-resolved"]),
        )
        .family(
            Family::Alpine,
            VersionMap::new()
                .entry(
                    "common",
                    &[
                        "alpine-base",
                        "openrc",
                        "busybox-openrc",
                        "openssh-server",
                        "iproute2",
                        "ca-certificates",
                        "conntrack-tools",
                        "cloud-utils-growpart",
                        "dosfstools",
                        "e2fsprogs",
                        "sgdisk",
                        "parted",
                        "lvm2",
                        "cryptsetup",
                        "squashfs-tools",
                        "dracut",
                        "eudev",
                        "haveged",
                        "jq",
                    ],
                )
                .entry(">=3.19", &["dbus-openrc"]),
        )
        .family(
            Family::Suse,
            VersionMap::common(&[
                "systemd",
                "systemd-network",
                "openssh",
                "iproute2",
                "ca-certificates",
                "conntrack-tools",
                "growpart",
                "dosfstools",
                "e2fsprogs",
                "gptfdisk",
                "parted",
                "lvm2",
                "cryptsetup",
                "squashfs",
                "dracut",
                "haveged",
                "jq",
            ]),
        )
        .distro(
            Distro::OpensuseLeap,
            VersionMap::new().entry(">=15.6", &["systemd-resolved"]),
        )
        .family(
            Family::Arch,
            VersionMap::common(&[
                "systemd",
                "openssh",
                "iproute2",
                "ca-certificates",
                "conntrack-tools",
                "cloud-guest-utils",
                "dosfstools",
                "e2fsprogs",
                "gptfdisk",
                "parted",
                "lvm2",
                "cryptsetup",
                "squashfs-tools",
                "dracut",
                "jq",
            ]),
        )
}

fn build_kernel() -> PackageMatrix {
    PackageMatrix::new("kernel")
        .distro(
            Distro::Ubuntu,
            VersionMap::new()
                .entry(">=20.04", &["linux-image-generic-hwe-{{version}}"])
                .entry("<20.04", &["linux-image-generic"])
                .entry("common", &["linux-firmware"]),
        )
        .distro(
            Distro::Debian,
            VersionMap::common(&["linux-image-{{arch}}", "firmware-linux-free"]),
        )
        .family(
            Family::RedHat,
            VersionMap::common(&["kernel", "kernel-modules", "kernel-modules-extra"]),
        )
        .family(
            Family::Alpine,
            VersionMap::common(&["linux-lts", "linux-firmware-none"]),
        )
        .row(
            Target::Family(Family::Alpine),
            ArchAxis::Arch(Architecture::Arm64),
            VersionMap::common(&["linux-firmware-brcm"]),
        )
        .family(
            Family::Suse,
            VersionMap::common(&["kernel-default", "kernel-firmware-all"]),
        )
        .family(Family::Arch, VersionMap::common(&["linux", "linux-firmware"]))
}

fn build_grub() -> PackageMatrix {
    PackageMatrix::new("grub")
        .row(
            Target::Family(Family::Debian),
            ArchAxis::Arch(Architecture::Amd64),
            VersionMap::common(&[
                "grub2-common",
                "grub-efi-amd64-bin",
                "grub-efi-amd64-signed",
                "grub-pc-bin",
                "shim-signed",
            ]),
        )
        .row(
            Target::Family(Family::Debian),
            ArchAxis::Arch(Architecture::Arm64),
            VersionMap::common(&["grub2-common", "grub-efi-arm64-bin"]),
        )
        .row(
            Target::Family(Family::RedHat),
            ArchAxis::Arch(Architecture::Amd64),
            VersionMap::common(&["grub2", "grub2-efi-x64", "grub2-efi-x64-modules", "shim-x64"]),
        )
        .row(
            Target::Family(Family::RedHat),
            ArchAxis::Arch(Architecture::Arm64),
            VersionMap::common(&["grub2", "grub2-efi-aa64", "grub2-efi-aa64-modules", "shim-aa64"]),
        )
        .family(Family::Alpine, VersionMap::common(&["grub", "grub-efi"]))
        .row(
            Target::Family(Family::Alpine),
            ArchAxis::Arch(Architecture::Amd64),
            VersionMap::common(&["grub-bios"]),
        )
        .family(Family::Suse, VersionMap::common(&["grub2"]))
        .row(
            Target::Family(Family::Suse),
            ArchAxis::Arch(Architecture::Amd64),
            VersionMap::common(&["grub2-i386-pc", "grub2-x86_64-efi", "shim"]),
        )
        .row(
            Target::Family(Family::Suse),
            ArchAxis::Arch(Architecture::Arm64),
            VersionMap::common(&["grub2-arm64-efi"]),
        )
        .family(Family::Arch, VersionMap::common(&["grub", "efibootmgr"]))
}

fn build_trusted_boot() -> PackageMatrix {
    PackageMatrix::new("trusted-boot")
        .distro(
            Distro::Ubuntu,
            VersionMap::new()
                .entry(">=24.04", &["systemd-boot", "systemd-ukify"])
                .entry("<24.04", &["systemd"]),
        )
        .distro(
            Distro::Debian,
            VersionMap::new().entry(">=12", &["systemd-boot", "systemd-boot-efi"]),
        )
        .family(
            Family::Debian,
            VersionMap::common(&["tpm2-tools", "sbsigntool"]),
        )
        .family(
            Family::RedHat,
            VersionMap::common(&["systemd-boot-unsigned", "systemd-ukify", "tpm2-tools"]),
        )
        .family(
            Family::Suse,
            VersionMap::common(&["systemd-boot", "tpm2.0-tools"]),
        )
        .family(Family::Arch, VersionMap::common(&["systemd-ukify", "tpm2-tools"]))
}

fn build_fips() -> PackageMatrix {
    PackageMatrix::new("fips")
        .family(Family::RedHat, VersionMap::common(&["crypto-policies-scripts", "dracut-fips"]))
        .distro(Distro::Ubuntu, VersionMap::common(&["openssl"]))
        .family(Family::Suse, VersionMap::common(&["patterns-base-fips"]))
}
