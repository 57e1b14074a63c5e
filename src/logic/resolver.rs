//! Package Matrix Resolver
//!
//! Translates a [`SystemDescriptor`] plus an ordered list of package matrices
//! into one flat, fully substituted package list.
//!
//! # Resolution Rules
//!
//! | Step | Rule |
//! |------|------|
//! | Prefix | the fixed common list always comes first |
//! | Lookup | distro×arch, distro×common, family×arch, family×common; all present rows are unioned |
//! | Keys | `common` always contributes; range keys contribute when the system version satisfies them |
//! | Order | matrix order, then lookup order, then declaration order; no sorting, no deduplication |
//! | Substitution | every name goes through the template engine |
//!
//! # Failure Model
//!
//! - Unparseable constraint key: logged and skipped.
//! - Unparseable system version: fatal, but only once a range key actually
//!   needs evaluating. A fully unknown system never reaches a range key and
//!   therefore always resolves.
//! - Template failure: fatal for the whole call.
//!
//! Resolution is a pure function of its inputs; the tables are never
//! mutated, so concurrent callers need no locking.

use crate::error::{ResolveError, VersionError};
use crate::logic::constraint::{parse_system_version, VersionKey};
use crate::logic::matrix::{ArchAxis, PackageMatrix, Target, VersionMap};
use crate::logic::template::{render, TemplateParams};
use crate::system::SystemDescriptor;
use semver::Version;
use tracing::{debug, warn};

// ============================================================================
// Package Resolution
// ============================================================================

/// Resolve the package list for `system` from `matrices`, prefixed by
/// `common`.
///
/// # What This Explicitly Refuses To Do
///
/// - Deduplicate: the same package named by two rules appears twice
/// - Validate package names: that is the package manager's job
pub fn resolve_packages<S: AsRef<str>>(
    system: &SystemDescriptor,
    common: &[S],
    matrices: &[&PackageMatrix],
) -> Result<Vec<String>, ResolveError> {
    let params = TemplateParams::from_descriptor(system);
    let mut version = LazyVersion::new(&system.version);
    let mut packages = Vec::new();

    for name in common {
        packages.push(render(name.as_ref(), &params)?);
    }

    for matrix in matrices {
        for (axis, map) in axis_lookups(matrix, system) {
            debug!("matrix {}: using row {}", matrix.name(), axis);
            append_version_map(map, &mut version, &params, &mut packages)?;
        }
    }

    Ok(packages)
}

/// The four axis lookups, in precedence order, keeping only present rows.
fn axis_lookups<'m>(
    matrix: &'m PackageMatrix,
    system: &SystemDescriptor,
) -> Vec<(String, &'m VersionMap)> {
    let axes = [
        (Target::Distro(system.distro), ArchAxis::Arch(system.arch)),
        (Target::Distro(system.distro), ArchAxis::Common),
        (Target::Family(system.family), ArchAxis::Arch(system.arch)),
        (Target::Family(system.family), ArchAxis::Common),
    ];

    axes.into_iter()
        .filter_map(|(target, arch)| {
            matrix
                .lookup(target, arch)
                .map(|map| (format!("{}/{}", target, arch), map))
        })
        .collect()
}

fn append_version_map(
    map: &VersionMap,
    version: &mut LazyVersion<'_>,
    params: &TemplateParams,
    packages: &mut Vec<String>,
) -> Result<(), ResolveError> {
    for (key, names) in map.entries() {
        let applies = match VersionKey::parse(key) {
            Ok(VersionKey::Common) => true,
            Ok(VersionKey::Range(constraint)) => constraint.matches(version.get()?),
            Err(e) => {
                warn!("skipping package rule: {}", e);
                continue;
            }
        };

        if !applies {
            debug!("constraint '{}' does not match, skipping {} packages", key, names.len());
            continue;
        }

        for name in names {
            packages.push(render(name, params)?);
        }
    }
    Ok(())
}

/// System version, parsed on first use.
struct LazyVersion<'a> {
    raw: &'a str,
    parsed: Option<Version>,
}

impl<'a> LazyVersion<'a> {
    fn new(raw: &'a str) -> Self {
        Self { raw, parsed: None }
    }

    fn get(&mut self) -> Result<&Version, VersionError> {
        let version = match self.parsed.take() {
            Some(v) => v,
            None => parse_system_version(self.raw)?,
        };
        Ok(self.parsed.insert(version))
    }
}

// ============================================================================
// Tests
// ============================================================================
