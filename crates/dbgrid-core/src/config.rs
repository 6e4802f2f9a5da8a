//! Grid configuration
//!
//! Loaded from a TOML or JSON file. Every field has a default, so an empty
//! document is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Undo history kept when no capacity is configured
pub const DEFAULT_UNDO_CAPACITY: usize = 1000;

/// Where NULL sorts relative to other values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullPosition {
    /// NULL values appear first
    First,
    /// NULL values appear last (default, matches SQL behavior)
    #[default]
    Last,
}

impl NullPosition {
    /// Get display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::First => "NULLS FIRST",
            Self::Last => "NULLS LAST",
        }
    }
}

/// Tunables for the table cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Maximum number of undo entries; the oldest is evicted past this
    pub undo_capacity: usize,
    /// NULL placement for view sorting and filter-choice lists
    pub null_position: NullPosition,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            undo_capacity: DEFAULT_UNDO_CAPACITY,
            null_position: NullPosition::Last,
        }
    }
}

impl GridConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| CoreError::Configuration(e.to_string()))?;
        config.validate()
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(source).map_err(|e| CoreError::Configuration(e.to_string()))?;
        config.validate()
    }

    /// Read a configuration file; `.json` files are parsed as JSON, anything
    /// else as TOML
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        tracing::debug!(path = %path.display(), ?config, "Loaded grid configuration");
        Ok(config)
    }

    fn validate(self) -> Result<Self> {
        if self.undo_capacity == 0 {
            return Err(CoreError::Configuration(
                "undo_capacity must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}
