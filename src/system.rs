//! System descriptor resolution.
//!
//! Turns raw os-release identification data into a canonical
//! [`SystemDescriptor`]: distro, family, architecture, version and display
//! name.
//!
//! # Design
//!
//! - **Never fails**: a missing or unreadable identification source yields a
//!   fully unknown descriptor. Unknown values are legitimate and only match
//!   `common` matrix rules downstream.
//! - **Table driven**: `ID` is looked up in a fixed distro table; on a miss,
//!   each `ID_LIKE` token is tried against a family table that picks a
//!   canonical representative distro.
//! - **No shelling out**: architecture comes from the running binary's target
//!   and is restricted to the supported set.

use crate::types::{Architecture, Distro, Family};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Primary os-release location
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Fallback location used when `/etc/os-release` is absent
pub const OS_RELEASE_FALLBACK_PATH: &str = "/usr/lib/os-release";

/// Version reported when the identification source has none
pub const UNKNOWN_VERSION: &str = "unknown";

// ============================================================================
// os-release parsing
// ============================================================================

/// Parsed os-release key/value data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    fields: BTreeMap<String, String>,
}

impl OsRelease {
    /// Parse newline-delimited `KEY=VALUE` data.
    ///
    /// Blank lines and `#` comments are skipped; values may be wrapped in
    /// double or single quotes. Lines without `=` are ignored.
    pub fn parse(content: &str) -> Self {
        let mut fields = BTreeMap::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                debug!("ignoring malformed os-release line: {}", line);
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            fields.insert(key.to_string(), unquote(value.trim()));
        }

        Self { fields }
    }

    /// Read and parse an os-release file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Look up a key, treating empty values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Strip one level of quoting. Double-quoted and bare values follow shell
/// escaping, so `\"`, `\\`, `` \` `` and `\$` lose their backslash; single
/// quotes are literal.
fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    let inner = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    };
    unescape(inner)
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(escaped @ ('"' | '\\' | '`' | '$')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ============================================================================
// Descriptor
// ============================================================================

/// Canonical description of the OS target being provisioned.
///
/// Created once per invocation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemDescriptor {
    pub distro: Distro,
    pub family: Family,
    pub arch: Architecture,
    pub version: String,
    pub name: String,
}

impl SystemDescriptor {
    /// Fully unknown descriptor (every axis unknown).
    pub fn unknown() -> Self {
        Self {
            distro: Distro::Unknown,
            family: Family::Unknown,
            arch: Architecture::Unknown,
            version: UNKNOWN_VERSION.to_string(),
            name: "Unknown".to_string(),
        }
    }

    /// Detect the running system from os-release and the CPU architecture.
    pub fn detect() -> Self {
        let primary = Path::new(OS_RELEASE_PATH);
        let path = if primary.exists() {
            primary
        } else {
            Path::new(OS_RELEASE_FALLBACK_PATH)
        };
        let descriptor = Self::from_os_release_file(path, detect_architecture());
        info!("System detection: {}", descriptor);
        descriptor
    }

    /// Resolve from an os-release file. An unreadable file yields the unknown
    /// descriptor (architecture is still reported).
    pub fn from_os_release_file(path: &Path, arch: Architecture) -> Self {
        match OsRelease::from_file(path) {
            Ok(data) => Self::resolve(&data, arch),
            Err(e) => {
                warn!(
                    "cannot read OS identification from {}: {}; treating system as unknown",
                    path.display(),
                    e
                );
                Self {
                    arch,
                    ..Self::unknown()
                }
            }
        }
    }

    /// Resolve a descriptor from parsed identification data.
    pub fn resolve(data: &OsRelease, arch: Architecture) -> Self {
        let id = data.get("ID").map(|s| s.to_ascii_lowercase());
        let like = data.get("ID_LIKE").map(|s| s.to_ascii_lowercase());

        let (distro, family) = match id.as_deref().and_then(lookup_distro) {
            Some(hit) => hit,
            None => {
                let fallback = like.as_deref().and_then(lookup_like);
                match fallback {
                    Some(family) => {
                        debug!(
                            "ID {:?} not in distro table, using family {} from ID_LIKE {:?}",
                            id, family, like
                        );
                        (canonical_distro(family), family)
                    }
                    None => {
                        warn!("unrecognized OS (ID={:?}, ID_LIKE={:?})", id, like);
                        (Distro::Unknown, Family::Unknown)
                    }
                }
            }
        };

        let version = match data.get("VERSION_ID") {
            Some(v) => truncate_version(family, v),
            None => {
                warn!("os-release has no VERSION_ID");
                UNKNOWN_VERSION.to_string()
            }
        };

        let name = data
            .get("PRETTY_NAME")
            .or_else(|| data.get("NAME"))
            .map(str::to_string)
            .unwrap_or_else(|| {
                warn!("os-release has no PRETTY_NAME or NAME");
                "Unknown".to_string()
            });

        Self {
            distro,
            family,
            arch,
            version,
            name,
        }
    }
}

impl fmt::Display for SystemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{} {} {})",
            self.name, self.family, self.distro, self.version, self.arch
        )
    }
}

/// Architecture of the running system, restricted to the supported set.
pub fn detect_architecture() -> Architecture {
    Architecture::from_machine(std::env::consts::ARCH)
}

// ============================================================================
// Lookup tables
// ============================================================================

const DISTRO_TABLE: &[(&str, Distro, Family)] = &[
    ("ubuntu", Distro::Ubuntu, Family::Debian),
    ("debian", Distro::Debian, Family::Debian),
    ("fedora", Distro::Fedora, Family::RedHat),
    ("rhel", Distro::Rhel, Family::RedHat),
    ("rocky", Distro::RockyLinux, Family::RedHat),
    ("rockylinux", Distro::RockyLinux, Family::RedHat),
    ("almalinux", Distro::AlmaLinux, Family::RedHat),
    ("centos", Distro::Centos, Family::RedHat),
    ("alpine", Distro::Alpine, Family::Alpine),
    ("opensuse-leap", Distro::OpensuseLeap, Family::Suse),
    ("opensuse-tumbleweed", Distro::OpensuseTumbleweed, Family::Suse),
    ("sles", Distro::Sles, Family::Suse),
    ("arch", Distro::Arch, Family::Arch),
];

const LIKE_TABLE: &[(&str, Family)] = &[
    ("debian", Family::Debian),
    ("ubuntu", Family::Debian),
    ("rhel", Family::RedHat),
    ("fedora", Family::RedHat),
    ("centos", Family::RedHat),
    ("suse", Family::Suse),
    ("opensuse", Family::Suse),
    ("alpine", Family::Alpine),
    ("arch", Family::Arch),
];

fn lookup_distro(id: &str) -> Option<(Distro, Family)> {
    DISTRO_TABLE
        .iter()
        .find(|(key, _, _)| *key == id)
        .map(|(_, distro, family)| (*distro, *family))
}

/// First `ID_LIKE` token with a known family wins.
fn lookup_like(like: &str) -> Option<Family> {
    like.split_whitespace().find_map(|token| {
        LIKE_TABLE
            .iter()
            .find(|(key, _)| *key == token)
            .map(|(_, family)| *family)
    })
}

/// Representative distro chosen when only the family is known.
pub fn canonical_distro(family: Family) -> Distro {
    match family {
        Family::Debian => Distro::Debian,
        Family::RedHat => Distro::Rhel,
        Family::Alpine => Distro::Alpine,
        Family::Suse => Distro::OpensuseLeap,
        Family::Arch => Distro::Arch,
        Family::Unknown => Distro::Unknown,
    }
}

/// Alpine publishes point releases (`3.19.1`) but its repositories and
/// package sets are keyed by `major.minor`.
fn truncate_version(family: Family, version: &str) -> String {
    match family {
        Family::Alpine => version.split('.').take(2).collect::<Vec<_>>().join("."),
        _ => version.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
