//! Operator configuration.
//!
//! Reads `<CURATOR_HOME>/config.toml`. Every field is optional; missing
//! sections and keys fall back to the values in [`crate::defaults`].

use crate::defaults::{
    DEFAULT_ACTION_PROGRAM, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_PAGE_SIZE, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_WORKERS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CuratorConfig {
    #[serde(default)]
    pub pool: PoolSection,

    #[serde(default)]
    pub registry: RegistrySection,

    #[serde(default)]
    pub action: ActionSection,
}

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSection {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Registry access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySection {
    /// JSON snapshot backing the local registry. `None` uses the default
    /// location under the Curator home.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,

    /// Per-call timeout in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            snapshot: None,
            call_timeout_secs: default_call_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

/// How rendered actions are executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSection {
    /// Program invoked with the words of each rendered action
    #[serde(default = "default_action_program")]
    pub program: String,
}

impl Default for ActionSection {
    fn default() -> Self {
        Self {
            program: default_action_program(),
        }
    }
}

fn default_workers() -> usize { DEFAULT_WORKERS }
fn default_queue_capacity() -> usize { DEFAULT_QUEUE_CAPACITY }
fn default_call_timeout_secs() -> u64 { DEFAULT_CALL_TIMEOUT_SECS }
fn default_page_size() -> usize { DEFAULT_PAGE_SIZE }
fn default_action_program() -> String { DEFAULT_ACTION_PROGRAM.to_string() }

impl CuratorConfig {
    /// Load from `path`, returning defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: CuratorConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            return Err(ConfigError::Invalid("pool.workers must be at least 1".to_string()));
        }
        if self.pool.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pool.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.registry.page_size == 0 {
            return Err(ConfigError::Invalid(
                "registry.page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.registry
            .snapshot
            .clone()
            .unwrap_or_else(|| crate::paths::CuratorPaths::from_env().registry_snapshot())
    }
}
