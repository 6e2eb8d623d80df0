//! Configuration
//!
//! Optional TOML file at `<config dir>/stevedore/config.toml`. Every field
//! has a default, so a missing file means defaults and an unreadable or
//! malformed file is a hard error rather than silently ignored settings.

use crate::error::{StevedoreError, StevedoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

fn default_engine_binary() -> String {
    "finch".to_string()
}

fn default_grace_period_secs() -> u64 {
    10
}

fn default_lock_timeout_secs() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Container engine executable name or path
    pub engine_binary: String,
    /// Seconds between SIGTERM and SIGKILL on shutdown
    pub grace_period_secs: u64,
    /// Seconds to wait for a concurrent build of the same key
    pub lock_timeout_secs: u64,
    /// Override for the cache metadata directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_binary: default_engine_binary(),
            grace_period_secs: default_grace_period_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            cache_dir: None,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stevedore")
            .join("config.toml")
    }

    /// Load from `path` if given, otherwise the default location. A missing
    /// default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> StevedoreResult<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                debug!("no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(StevedoreError::ConfigInvalid {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        let config: Config = toml::from_str(&text).map_err(|e| StevedoreError::ConfigInvalid {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        config.validate(&path)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn validate(&self, path: &Path) -> StevedoreResult<()> {
        if self.engine_binary.trim().is_empty() {
            return Err(StevedoreError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "engine_binary must not be empty".to_string(),
            });
        }
        if self.grace_period_secs == 0 {
            return Err(StevedoreError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: "grace_period_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(crate::cache::default_cache_dir)
    }
}
