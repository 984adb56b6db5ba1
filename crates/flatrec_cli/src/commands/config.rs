//! Settings file for the CLI.
//!
//! ```json
//! {
//!   "scratch_capacity": 4096,
//!   "auto_sync": false,
//!   "files": {
//!     "user-table": { "name": "users.csv", "fixed_width": true }
//!   }
//! }
//! ```

use flatrec_core::{Config, CoreError, FileDescriptor, FileKind, Registry};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading a settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Settings file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for [`CliConfig`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Settings file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A value was rejected by the engine.
    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// Overrides for one registry entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FileOverride {
    /// File name on the volume root.
    pub name: String,
    /// Fixed-width hint.
    #[serde(default)]
    pub fixed_width: bool,
}

/// Settings file contents. Absent fields keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    /// Scratch buffer size in bytes.
    pub scratch_capacity: Option<usize>,
    /// Sync after every write.
    pub auto_sync: Option<bool>,
    /// Quiet time after a publish before syncing.
    pub publish_cooldown_ms: Option<u64>,
    /// Minimum time between recovery attempts.
    pub recovery_cooldown_secs: Option<u64>,
    /// Delay after each power-cycle edge.
    pub power_cycle_delay_ms: Option<u64>,
    /// Per-kind file overrides keyed by kebab-case kind.
    #[serde(default)]
    pub files: BTreeMap<String, FileOverride>,
}

impl CliConfig {
    /// Reads and parses a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layers these settings over `config` and `registry`.
    pub fn apply(
        &self,
        mut config: Config,
        mut registry: Registry,
    ) -> Result<(Config, Registry), ConfigError> {
        if let Some(bytes) = self.scratch_capacity {
            config = config.scratch_capacity(bytes);
        }
        if let Some(enabled) = self.auto_sync {
            config = config.auto_sync(enabled);
        }
        if let Some(ms) = self.publish_cooldown_ms {
            config = config.publish_cooldown(Duration::from_millis(ms));
        }
        if let Some(secs) = self.recovery_cooldown_secs {
            config = config.recovery_cooldown(Duration::from_secs(secs));
        }
        if let Some(ms) = self.power_cycle_delay_ms {
            config = config.power_cycle_delay(Duration::from_millis(ms));
        }
        for (key, file) in &self.files {
            let kind: FileKind = key.parse()?;
            registry = registry
                .with_descriptor(kind, FileDescriptor::new(file.name.clone(), file.fixed_width));
        }

        config.validate()?;
        registry.validate()?;
        Ok((config, registry))
    }
}
