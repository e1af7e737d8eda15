use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::EngineOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Source files processed per catalog transaction.
    #[serde(default = "default_source_batch_size")]
    pub source_batch_size: usize,

    /// Destination files inspected per reconciliation transaction.
    #[serde(default = "default_reconcile_batch_size")]
    pub reconcile_batch_size: usize,

    /// How many `_NN` suffixes to try before giving up on a filename.
    #[serde(default = "default_collision_cap")]
    pub collision_cap: u32,
}

fn default_catalog_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photark")
        .join("photark.db")
}

fn default_source_batch_size() -> usize {
    500
}

fn default_reconcile_batch_size() -> usize {
    1000
}

fn default_collision_cap() -> u32 {
    999
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_batch_size: default_source_batch_size(),
            reconcile_batch_size: default_reconcile_batch_size(),
            collision_cap: default_collision_cap(),
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photark")
    }

    fn default_config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default location, falling back to defaults when no
    /// config file exists yet.
    pub fn load() -> Result<Self> {
        let path = Self::default_config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            source_batch_size: self.engine.source_batch_size,
            reconcile_batch_size: self.engine.reconcile_batch_size,
            collision_cap: self.engine.collision_cap,
        }
    }
}
