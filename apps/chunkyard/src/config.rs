//! Tool configuration.
//!
//! Configuration is stored as TOML at `~/.config/chunkyard/chunkyard.toml`
//! unless `--config` names another file:
//!
//! ```toml
//! log_level = "debug"
//!
//! [storage]
//! temp_root = "/var/lib/chunkyard/upload_temp"
//! output_root = "/var/lib/chunkyard/uploads"
//! purge_after_merge = true
//! ```

use std::path::{Path, PathBuf};

use chunkyard_transfer::StorageConfig;
use serde::{Deserialize, Serialize};

/// Tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// A missing file yields the defaults. An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("config file not found: {}", path.display());
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Applies command-line overrides for the storage roots.
    pub fn with_overrides(mut self, temp_root: Option<PathBuf>, output_root: Option<PathBuf>) -> Self {
        if let Some(root) = temp_root {
            self.storage.temp_root = root;
        }
        if let Some(root) = output_root {
            self.storage.output_root = root;
        }
        self
    }
}

/// Returns the default configuration file path.
fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("chunkyard")
        .join("chunkyard.toml")
}
