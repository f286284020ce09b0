//! Mount configuration.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes.

use crate::attr::{BLOCK_SIZE, NAME_MAX};
use crate::changes::MIN_RECORD_LEN;
use crate::watcher::DEFAULT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Configuration options for a SymFS mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SymfsConfig {
    /// Run the background change watcher after `init`.
    ///
    /// Default: true.
    pub watch: bool,

    /// Size in bytes of the buffer handed to the native change source.
    ///
    /// Larger buffers overflow less often under bursts of changes. Must hold
    /// at least one record. Default: 16384.
    pub watch_buffer_size: usize,

    /// Block size reported by `statfs`. Must be non-zero. Default: 4096.
    pub block_size: u32,

    /// Maximum name length reported by `statfs`. Default: 255.
    pub name_max: u32,
}

impl Default for SymfsConfig {
    fn default() -> Self {
        Self {
            watch: true,
            watch_buffer_size: DEFAULT_BUFFER_SIZE,
            block_size: BLOCK_SIZE,
            name_max: NAME_MAX,
        }
    }
}

impl SymfsConfig {
    /// Loads and validates a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values the builders would have clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch_buffer_size < MIN_RECORD_LEN {
            return Err(ConfigError::Invalid {
                field: "watch_buffer_size",
                reason: format!(
                    "{} is below the smallest change record ({MIN_RECORD_LEN} bytes)",
                    self.watch_buffer_size
                ),
            });
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid {
                field: "block_size",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Sets the change buffer size. Values too small for one record are
    /// raised to the smallest record size.
    #[must_use]
    pub fn watch_buffer_size(mut self, size: usize) -> Self {
        self.watch_buffer_size = size.max(MIN_RECORD_LEN);
        self
    }

    /// Sets the reported block size; zero is raised to 1.
    #[must_use]
    pub fn block_size(mut self, size: u32) -> Self {
        self.block_size = size.max(1);
        self
    }

    #[must_use]
    pub fn name_max(mut self, max: u32) -> Self {
        self.name_max = max;
        self
    }
}
