//! Session configuration loaded from TOML.
//!
//! ```toml
//! [naming]
//! auto_prefix = "column_"
//!
//! [join]
//! simplify = true
//! sort = true
//!
//! [align]
//! suffix = "__align_by"
//!
//! [logging]
//! filter = "sheaf=debug"
//! ```
//!
//! Every section and key is optional; missing values take their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, SheafError};

/// Generated column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Prefix of generated names; the frame-local counter follows it.
    pub auto_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            auto_prefix: "column_".to_owned(),
        }
    }
}

/// Defaults for frame joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Collapse pass-through takes in joined columns.
    pub simplify: bool,
    /// Sort the key union of outer joins.
    pub sort: bool,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            simplify: true,
            sort: true,
        }
    }
}

/// Multi-frame alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Marker appended (with the frame position) to non-key columns while
    /// frames share one accumulator.
    pub suffix: String,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            suffix: "__align_by".to_owned(),
        }
    }
}

/// Log filter used by [`crate::logging::init_logging`] callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_owned(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generated names.
    pub naming: NamingConfig,
    /// Join defaults.
    pub join: JoinConfig,
    /// Alignment.
    pub align: AlignConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Config {
    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the planners cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.naming.auto_prefix.is_empty() {
            return Err(SheafError::config("naming.auto_prefix must not be empty"));
        }
        if self.align.suffix.is_empty() {
            return Err(SheafError::config("align.suffix must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let config = Config::from_toml_str("[join]\nsort = false\n").expect("parse");
        assert!(!config.join.sort);
        assert!(config.join.simplify);
        assert_eq!(config.naming.auto_prefix, "column_");
        assert_eq!(config.align.suffix, "__align_by");
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn empty_prefix_is_rejected() {
        match Config::from_toml_str("[naming]\nauto_prefix = \"\"\n") {
            Err(SheafError::Config(msg)) => assert!(msg.contains("auto_prefix")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_toml_is_a_toml_error() {
        assert!(matches!(
            Config::from_toml_str("[join\n"),
            Err(SheafError::Toml(_))
        ));
    }
}
