//! hypotree configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists. `HYPOTREE_STORE_PATH` overrides the store directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `[store] path`.
pub const STORE_PATH_ENV: &str = "HYPOTREE_STORE_PATH";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HypotreeConfig {
    /// Where tree documents live.
    pub store: StoreConfig,
    /// Aggregation tuning.
    pub aggregation: AggregationConfig,
    /// In-memory tree cache.
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// One JSON document per tree in `path`.
    #[default]
    Fs,
    /// Process-local; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory holding `<tree_id>.json` documents.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregationConfig {
    /// Confirmed children at or above this confidence (other than the
    /// primary cause) are listed as secondary factors.
    pub secondary_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Loaded trees kept in memory. Idle trees beyond this are dropped and
    /// reloaded from the store on next use.
    pub max_trees: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Fs,
            path: PathBuf::from(".hypotree").join("trees"),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            secondary_threshold: 0.3,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_trees: 256 }
    }
}

impl HypotreeConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Apply environment overrides on top of whatever was loaded.
    pub fn with_env(mut self) -> Self {
        self.apply_store_path(std::env::var(STORE_PATH_ENV).ok());
        self
    }

    fn apply_store_path(&mut self, value: Option<String>) {
        if let Some(raw) = value {
            let raw = raw.trim();
            if !raw.is_empty() {
                self.store.path = PathBuf::from(raw);
            }
        }
    }

    /// Render as TOML (for `hypotree init-config`).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
