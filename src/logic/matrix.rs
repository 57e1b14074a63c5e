//! Package matrix data model.
//!
//! A [`PackageMatrix`] is a set of rows keyed by a target (a distro or a
//! family) and an architecture axis (a concrete architecture or the
//! architecture-common column). Each row carries a [`VersionMap`]: ordered
//! `(constraint key, package templates)` pairs.
//!
//! Lookups are explicit per axis and return `Option`, so "axis absent" and
//! "axis present but empty" never get confused.

use crate::types::{Architecture, Distro, Family};
use std::fmt;

/// Row selector on the distro/family axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Distro(Distro),
    Family(Family),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distro(d) => write!(f, "distro:{}", d),
            Self::Family(fam) => write!(f, "family:{}", fam),
        }
    }
}

/// Row selector on the architecture axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchAxis {
    Arch(Architecture),
    /// Applies to every architecture
    Common,
}

impl fmt::Display for ArchAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arch(a) => write!(f, "{}", a),
            Self::Common => write!(f, "common"),
        }
    }
}

/// Ordered mapping from constraint key to package templates.
///
/// Keys are kept as written; they are parsed at resolution time so that a
/// single bad key can be skipped without rejecting the whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionMap {
    entries: Vec<(String, Vec<String>)>,
}

impl VersionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Declaration order is resolution order.
    pub fn entry<S: AsRef<str>>(mut self, key: impl Into<String>, packages: &[S]) -> Self {
        self.entries.push((
            key.into(),
            packages.iter().map(|p| p.as_ref().to_string()).collect(),
        ));
        self
    }

    /// Shorthand for a map with a single `common` entry.
    pub fn common<S: AsRef<str>>(packages: &[S]) -> Self {
        Self::new().entry(super::constraint::COMMON_KEY, packages)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MatrixRow {
    target: Target,
    arch: ArchAxis,
    versions: VersionMap,
}

/// A named package matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMatrix {
    name: String,
    rows: Vec<MatrixRow>,
}

impl PackageMatrix {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Add a row. Declaring the same `(target, arch)` twice appends to the
    /// existing version map.
    pub fn row(mut self, target: Target, arch: ArchAxis, versions: VersionMap) -> Self {
        if let Some(existing) = self
            .rows
            .iter_mut()
            .find(|r| r.target == target && r.arch == arch)
        {
            existing.versions.entries.extend(versions.entries);
        } else {
            self.rows.push(MatrixRow {
                target,
                arch,
                versions,
            });
        }
        self
    }

    /// Convenience for a family row on the common architecture axis.
    pub fn family(self, family: Family, versions: VersionMap) -> Self {
        self.row(Target::Family(family), ArchAxis::Common, versions)
    }

    /// Convenience for a distro row on the common architecture axis.
    pub fn distro(self, distro: Distro, versions: VersionMap) -> Self {
        self.row(Target::Distro(distro), ArchAxis::Common, versions)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Single-axis lookup. `None` means the matrix has no such row.
    pub fn lookup(&self, target: Target, arch: ArchAxis) -> Option<&VersionMap> {
        self.rows
            .iter()
            .find(|r| r.target == target && r.arch == arch)
            .map(|r| &r.versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_absent_vs_empty() {
        let matrix = PackageMatrix::new("t")
            .family(Family::Debian, VersionMap::new())
            .row(
                Target::Distro(Distro::Ubuntu),
                ArchAxis::Arch(Architecture::Amd64),
                VersionMap::common(&["grub-pc-bin"]),
            );

        let empty = matrix.lookup(Target::Family(Family::Debian), ArchAxis::Common);
        assert!(empty.is_some_and(|m| m.is_empty()));
        assert!(matrix
            .lookup(Target::Family(Family::Debian), ArchAxis::Arch(Architecture::Amd64))
            .is_none());
        assert!(matrix
            .lookup(Target::Distro(Distro::Ubuntu), ArchAxis::Arch(Architecture::Amd64))
            .is_some());
    }

    #[test]
    fn test_version_map_preserves_order() {
        let map = VersionMap::new()
            .entry(">=24.04", &["b"])
            .entry("common", &["a"]);
        let keys: Vec<&str> = map.entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![">=24.04", "common"]);
    }

    #[test]
    fn test_duplicate_rows_are_merged_in_order() {
        let matrix = PackageMatrix::new("t")
            .family(Family::Alpine, VersionMap::common(&["a"]))
            .family(Family::Alpine, VersionMap::common(&["b"]));
        let map = matrix
            .lookup(Target::Family(Family::Alpine), ArchAxis::Common)
            .unwrap();
        let packages: Vec<&[String]> = map.entries().map(|(_, p)| p).collect();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[1], ["b".to_string()]);
    }

    #[test]
    fn test_axis_display() {
        assert_eq!(Target::Family(Family::RedHat).to_string(), "family:redhat");
        assert_eq!(ArchAxis::Arch(Architecture::Arm64).to_string(), "arm64");
        assert_eq!(ArchAxis::Common.to_string(), "common");
    }
}
