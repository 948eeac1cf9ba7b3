//! Local filesystem layout
//!
//! Everything the CLI keeps on disk lives under one home directory. Lookups
//! here never touch the filesystem; writers create directories on demand.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

const HOME_ENV: &str = "CURATOR_HOME";
const HOME_DIR_NAME: &str = ".curator";

/// Resolved locations under the Curator home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuratorPaths {
    home: PathBuf,
}

impl CuratorPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// `$CURATOR_HOME`, else `.curator` under the user's home, else under
    /// the working directory.
    pub fn from_env() -> Self {
        Self::resolve(|key| std::env::var_os(key))
    }

    fn resolve(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        if let Some(home) = lookup(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self::new(home);
        }
        let user_home = lookup("HOME")
            .or_else(|| lookup("USERPROFILE"))
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(user_home.join(HOME_DIR_NAME))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Snapshot of the local in-memory registry.
    pub fn registry_snapshot(&self) -> PathBuf {
        self.home.join("registry.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }
}
