//! Content store for opaque named assets.
//!
//! Stage generators never embed file bodies; they ask an [`AssetStore`] for
//! a named asset and put whatever comes back into the stage. Tests swap in a
//! [`MemoryAssets`] so planning can be exercised without real payloads.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

pub const MOTD: &str = "branding/motd";
pub const ISSUE: &str = "branding/issue";
pub const CLOUD_CONFIG_NETWORK: &str = "oem/00_network.yaml";
pub const CLOUD_CONFIG_ACCOUNTS: &str = "oem/05_accounts.yaml";
pub const GRUB_BOOTARGS: &str = "boot/bootargs.cfg";
pub const UKI_CMDLINE: &str = "boot/uki-cmdline";
pub const SERVICE_ENV: &str = "init/osplan.env";

/// Source of named content assets.
pub trait AssetStore {
    /// Return the asset body, or an error if the store has no such asset.
    fn get(&self, name: &str) -> Result<String>;
}

/// Assets compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinAssets;

const BUILTIN: &[(&str, &str)] = &[
    (MOTD, "Welcome to {{name}} {{version}}\n"),
    (ISSUE, "{{name}} {{version}} \\n \\l\n\n"),
    (
        CLOUD_CONFIG_NETWORK,
        "name: Default network\nstages:\n  initramfs:\n    - name: Enable DHCP\n      dns:\n        nameservers: []\n",
    ),
    (
        CLOUD_CONFIG_ACCOUNTS,
        "name: Default accounts\nstages:\n  initramfs:\n    - name: Lock root\n      users:\n        root:\n          lock: true\n",
    ),
    (
        GRUB_BOOTARGS,
        "set baseExtraArgs=\"\"\nset baseCmdline=\"console=tty1 console=ttyS0 net.ifnames=1\"\n",
    ),
    (UKI_CMDLINE, "console=tty1 console=ttyS0 net.ifnames=1 rd.neednet=0\n"),
    (SERVICE_ENV, "OSPLAN_MANAGED=true\n"),
];

impl AssetStore for BuiltinAssets {
    fn get(&self, name: &str) -> Result<String> {
        BUILTIN
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, body)| (*body).to_string())
            .ok_or_else(|| anyhow!("no built-in asset named '{}'", name))
    }
}

/// In-memory store, mostly for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    entries: BTreeMap<String, String>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in asset replaced by a short placeholder naming it.
    pub fn placeholders() -> Self {
        let mut store = Self::new();
        for (name, _) in BUILTIN {
            store = store.with(*name, format!("<{}>", name));
        }
        store
    }

    pub fn with(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.entries.insert(name.into(), body.into());
        self
    }
}

impl AssetStore for MemoryAssets {
    fn get(&self, name: &str) -> Result<String> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("no asset named '{}'", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_assets_present() {
        for (name, _) in BUILTIN {
            assert!(BuiltinAssets.get(name).is_ok(), "missing {}", name);
        }
        assert!(BuiltinAssets.get("nope").is_err());
    }

    #[test]
    fn test_memory_assets() {
        let store = MemoryAssets::new().with("a", "body");
        assert_eq!(store.get("a").unwrap(), "body");
        assert!(store.get("b").unwrap_err().to_string().contains("'b'"));
        assert_eq!(MemoryAssets::placeholders().get(MOTD).unwrap(), "<branding/motd>");
    }
}
