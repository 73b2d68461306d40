//! # Runtime Configuration Module
//!
//! Settings for the coroutine runtime and the store, loaded from an optional
//! YAML file and then overridden by environment variables.
//!
//! ## Environment Variables
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `EDGERUN_STACK_SIZE` | coroutine stack size, decimal or `0x` hex | `0x10000` |
//! | `EDGERUN_HANDLER_WORKERS` | worker coroutines per pool | `4` |
//! | `EDGERUN_STORE_MODE` | `none`, `strict` or `batched` | `none` |
//! | `EDGERUN_STORE_PATH` | journal file | `edgerun.journal` |
//! | `EDGERUN_STORE_BATCH_SIZE` | batched: writes per fsync | `64` |
//! | `EDGERUN_STORE_INTERVAL_MS` | batched: max ms between fsyncs | `100` |
//!
//! Unparseable numbers fall back to the default. An unknown store mode is
//! reported when the store is opened.
//!
//! ## YAML
//!
//! ```yaml
//! stack_size: 65536
//! handler_workers: 8
//! store:
//!   mode: batched
//!   path: /var/lib/edgerun/kv.journal
//!   batch_size: 32
//!   interval_ms: 50
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use edgerun::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::{DurabilityMode, KvStore};

pub const DEFAULT_STACK_SIZE: usize = 0x10000;
pub const DEFAULT_HANDLER_WORKERS: usize = 4;
pub const DEFAULT_STORE_PATH: &str = "edgerun.journal";
pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_INTERVAL_MS: u64 = 100;

/// Store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// `none`, `strict` or `batched`
    pub mode: String,
    pub path: PathBuf,
    pub batch_size: usize,
    pub interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: "none".to_string(),
            path: PathBuf::from(DEFAULT_STORE_PATH),
            batch_size: DEFAULT_BATCH_SIZE,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl StoreConfig {
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        DurabilityMode::parse(&self.mode, self.interval_ms, self.batch_size).ok_or_else(|| {
            anyhow!(
                "unknown store mode '{}' (expected none, strict or batched)",
                self.mode
            )
        })
    }

    /// Open the store these settings describe.
    pub fn open_store(&self) -> Result<KvStore> {
        let mode = self.durability_mode()?;
        KvStore::open(&self.path, mode)
            .with_context(|| format!("Failed to open store at {}", self.path.display()))
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
    /// Worker coroutines per pool
    pub handler_workers: usize,
    pub store: StoreConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            handler_workers: DEFAULT_HANDLER_WORKERS,
            store: StoreConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overridden by `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup);
        config
    }

    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse runtime config")
    }

    /// Load `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_yaml_str(&text)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| env::var(name).ok());
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(size) = lookup("EDGERUN_STACK_SIZE").and_then(|s| parse_size(&s)) {
            self.stack_size = size;
        }
        if let Some(n) = lookup("EDGERUN_HANDLER_WORKERS").and_then(|s| s.trim().parse().ok()) {
            self.handler_workers = n;
        }
        if let Some(mode) = lookup("EDGERUN_STORE_MODE") {
            self.store.mode = mode.trim().to_string();
        }
        if let Some(path) = lookup("EDGERUN_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Some(n) = lookup("EDGERUN_STORE_BATCH_SIZE").and_then(|s| s.trim().parse().ok()) {
            self.store.batch_size = n;
        }
        if let Some(n) = lookup("EDGERUN_STORE_INTERVAL_MS").and_then(|s| s.trim().parse().ok()) {
            self.store.interval_ms = n;
        }
    }
}

/// Decimal or `0x`-prefixed hex.
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
