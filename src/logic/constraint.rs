//! Version constraint expressions used as package matrix keys.
//!
//! A key is either the literal `common` (always matches) or a range
//! expression: comparators (`>=`, `<=`, `>`, `<`, `=`, or a bare version)
//! separated by commas or whitespace are ANDed together, and alternatives
//! separated by `||` are ORed.
//!
//! Distro versions are rarely strict semver (`24.04`, `40`, `3.19`), so both
//! sides are read leniently: one to three numeric components, leading zeros
//! allowed. Partial versions behave like semver partial comparators, so
//! `<=18.04` also admits `18.04.5` while `>=20.04` starts at `20.4.0`.

use crate::error::VersionError;
use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use std::fmt;

/// Literal key that matches every version
pub const COMMON_KEY: &str = "common";

/// Parsed matrix key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionKey {
    Common,
    Range(Constraint),
}

impl VersionKey {
    pub fn parse(key: &str) -> Result<Self, VersionError> {
        if key.trim() == COMMON_KEY {
            Ok(Self::Common)
        } else {
            Constraint::parse(key).map(Self::Range)
        }
    }
}

/// An OR of AND-ed comparator sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl Constraint {
    pub fn parse(expr: &str) -> Result<Self, VersionError> {
        let fail = |reason: String| VersionError::Constraint {
            constraint: expr.to_string(),
            reason,
        };

        let mut alternatives = Vec::new();
        for alternative in expr.split("||") {
            let comparators = parse_comparators(alternative).map_err(fail)?;
            alternatives.push(VersionReq { comparators });
        }

        Ok(Self {
            raw: expr.to_string(),
            alternatives,
        })
    }

    /// True when any alternative admits `version`.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse a descriptor version such as `22.04` or `3.19.1`.
pub fn parse_system_version(version: &str) -> Result<Version, VersionError> {
    let parts = parse_numeric_parts(version).map_err(|reason| VersionError::System {
        version: version.to_string(),
        reason,
    })?;
    Ok(Version::new(
        parts[0],
        parts.get(1).copied().unwrap_or(0),
        parts.get(2).copied().unwrap_or(0),
    ))
}

// ============================================================================
// Parsing helpers
// ============================================================================

const OPERATORS: &[(&str, Op)] = &[
    (">=", Op::GreaterEq),
    ("<=", Op::LessEq),
    ("==", Op::Exact),
    (">", Op::Greater),
    ("<", Op::Less),
    ("=", Op::Exact),
];

fn split_operator(token: &str) -> (Op, &str) {
    for (symbol, op) in OPERATORS {
        if let Some(rest) = token.strip_prefix(symbol) {
            return (*op, rest);
        }
    }
    (Op::Exact, token)
}

fn parse_comparators(alternative: &str) -> Result<Vec<Comparator>, String> {
    let normalized = alternative.replace(',', " ");
    let mut tokens = normalized.split_whitespace();
    let mut comparators = Vec::new();

    while let Some(token) = tokens.next() {
        let (op, mut version) = split_operator(token);
        if version.is_empty() {
            // operator separated from its version: ">= 20.04"
            version = tokens
                .next()
                .ok_or_else(|| format!("operator '{}' has no version", token))?;
        }
        comparators.push(comparator(op, version)?);
    }

    if comparators.is_empty() {
        return Err("empty constraint".to_string());
    }
    Ok(comparators)
}

fn comparator(op: Op, version: &str) -> Result<Comparator, String> {
    let parts = parse_numeric_parts(version)?;
    Ok(Comparator {
        op,
        major: parts[0],
        minor: parts.get(1).copied(),
        patch: parts.get(2).copied(),
        pre: Prerelease::EMPTY,
    })
}

fn parse_numeric_parts(version: &str) -> Result<Vec<u64>, String> {
    let trimmed = version.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if bare.is_empty() {
        return Err("empty version".to_string());
    }

    let parts = bare
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("'{}' is not a numeric version component", part));
            }
            part.parse::<u64>()
                .map_err(|e| format!("'{}' is out of range: {}", part, e))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if parts.len() > 3 {
        return Err(format!("'{}' has more than three components", bare));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_system_version(s).unwrap()
    }

    #[test]
    fn test_common_key() {
        assert_eq!(VersionKey::parse("common").unwrap(), VersionKey::Common);
        assert!(matches!(VersionKey::parse(">=1").unwrap(), VersionKey::Range(_)));
    }

    #[test]
    fn test_greater_equal() {
        let c = Constraint::parse(">=20.04").unwrap();
        assert!(c.matches(&v("22.04")));
        assert!(c.matches(&v("20.04")));
        assert!(!c.matches(&v("18.04")));
    }

    #[test]
    fn test_compound_or() {
        let c = Constraint::parse(">=20.04||<=18.04").unwrap();
        assert!(c.matches(&v("22.04")));
        assert!(c.matches(&v("16.04")));
        assert!(!c.matches(&v("19.10")));
    }

    #[test]
    fn test_compound_or_with_spaces() {
        let c = Constraint::parse(" >= 20.04 || <= 18.04 ").unwrap();
        assert!(c.matches(&v("24.04")));
        assert!(!c.matches(&v("19.10")));
    }

    #[test]
    fn test_and_range() {
        let c = Constraint::parse(">=3.16, <3.20").unwrap();
        assert!(c.matches(&v("3.19")));
        assert!(!c.matches(&v("3.20")));
        assert!(!c.matches(&v("3.15")));

        let c = Constraint::parse(">=9 <10").unwrap();
        assert!(c.matches(&v("9.4")));
        assert!(!c.matches(&v("10.0")));
    }

    #[test]
    fn test_strict_operators() {
        let c = Constraint::parse(">39").unwrap();
        assert!(c.matches(&v("40")));
        assert!(!c.matches(&v("39")));

        let c = Constraint::parse("<12").unwrap();
        assert!(c.matches(&v("11")));
        assert!(!c.matches(&v("12")));
    }

    #[test]
    fn test_partial_upper_bound_admits_point_releases() {
        let c = Constraint::parse("<=18.04").unwrap();
        assert!(c.matches(&v("18.04.5")));
        assert!(!c.matches(&v("18.10")));
    }

    #[test]
    fn test_bare_version_is_exact() {
        let c = Constraint::parse("15.6").unwrap();
        assert!(c.matches(&v("15.6")));
        assert!(!c.matches(&v("15.5")));
    }

    #[test]
    fn test_invalid_constraints() {
        for bad in ["", ">=", "~>1.0", ">=abc", "1.2.3.4", ">=20.04||", "^1"] {
            assert!(Constraint::parse(bad).is_err(), "expected error for {:?}", bad);
        }
    }

    #[test]
    fn test_system_version_parsing() {
        assert_eq!(v("24.04"), Version::new(24, 4, 0));
        assert_eq!(v("40"), Version::new(40, 0, 0));
        assert_eq!(v("3.19.1"), Version::new(3, 19, 1));
        assert_eq!(v("v1.2"), Version::new(1, 2, 0));
        assert!(parse_system_version("unknown").is_err());
        assert!(parse_system_version("rolling").is_err());
        assert!(parse_system_version("").is_err());
    }

    #[test]
    fn test_display_keeps_raw_text() {
        let c = Constraint::parse(">=20.04||<=18.04").unwrap();
        assert_eq!(c.to_string(), ">=20.04||<=18.04");
    }
}
