//! # Engine Configuration
//!
//! Tunables for an [`EnginesRoot`](crate::EnginesRoot). Loaded once at
//! startup, either built in code or parsed from TOML.
//!
//! ```toml
//! default_partition_capacity = 128
//! staging_capacity = 512
//! log_submissions = true
//! ```

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine tunables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial row capacity of a partition table created on first insert.
    pub default_partition_capacity: usize,
    /// Initial capacity of each staged-operation list.
    pub staging_capacity: usize,
    /// Emit a `debug` event summarising every non-empty submission.
    pub log_submissions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_partition_capacity: 64,
            staging_capacity: 256,
            log_submissions: true,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from TOML text. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the text is not valid TOML for
    /// this structure or a value is out of range.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> EngineResult<()> {
        if self.staging_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "staging_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
