//! Kernel probe collaborator.
//!
//! The kernel-selection stage needs to know which kernels the install
//! pipeline left behind in the target root. That is I/O, so it sits behind
//! [`KernelProbe`]; the composer only sees a list of version strings.

use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reports kernel versions installed in a target root.
pub trait KernelProbe {
    /// Installed kernel versions, oldest first. An empty list means no
    /// kernel is installed yet.
    fn installed_kernels(&self) -> Result<Vec<String>>;
}

/// Probe that lists `<root>/lib/modules`.
#[derive(Debug, Clone)]
pub struct FsKernelProbe {
    root: PathBuf,
}

impl FsKernelProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.root.join("lib/modules")
    }
}

impl KernelProbe for FsKernelProbe {
    fn installed_kernels(&self) -> Result<Vec<String>> {
        let dir = self.modules_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            // Nothing installed yet
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist", dir.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to list kernel modules in {}", dir.display()));
            }
        };

        let mut kernels = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_kernel_dir(&entry.path(), &name) {
                debug!("ignoring {} in {}", name, dir.display());
                continue;
            }
            kernels.push(name);
        }

        kernels.sort_by(|a, b| compare_kernel_versions(a, b));
        Ok(kernels)
    }
}

fn is_kernel_dir(path: &Path, name: &str) -> bool {
    path.is_dir() && name.starts_with(|c: char| c.is_ascii_digit())
}

/// Fixed answer, for tests and for callers that already know the kernel.
#[derive(Debug, Clone, Default)]
pub struct StaticKernelProbe {
    kernels: Vec<String>,
}

impl StaticKernelProbe {
    pub fn new<I, S>(kernels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kernels: Vec<String> = kernels.into_iter().map(Into::into).collect();
        kernels.sort_by(|a, b| compare_kernel_versions(a, b));
        Self { kernels }
    }
}

impl KernelProbe for StaticKernelProbe {
    fn installed_kernels(&self) -> Result<Vec<String>> {
        Ok(self.kernels.clone())
    }
}

/// Order kernel release strings by their numeric fields.
///
/// `6.8.0-45-generic` sorts after `6.8.0-9-generic`; ties fall back to plain
/// string order so the result is total.
pub fn compare_kernel_versions(a: &str, b: &str) -> Ordering {
    numeric_fields(a)
        .cmp(&numeric_fields(b))
        .then_with(|| a.cmp(b))
}

fn numeric_fields(release: &str) -> Vec<u64> {
    release
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().unwrap_or(u64::MAX))
        .collect()
}

/// Newest kernel from a probe result, if any.
pub fn latest_kernel(kernels: &[String]) -> Option<&str> {
    kernels
        .iter()
        .max_by(|a, b| compare_kernel_versions(a, b))
        .map(String::as_str)
}
