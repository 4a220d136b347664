//! Analyzer configuration
//!
//! Configuration is read from an optional JSON file. Missing keys fall back to
//! the defaults of the McM test area layout.

use std::path::Path;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::core::patterns::LogLayout;

/// Settings for an analysis run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Naming convention of the job log files
    pub layout: LogLayout,
    /// Fail instead of defaulting metrics that are missing from the logs
    pub strict: bool,
}

/// Create default configuration
pub fn default_config() -> AnalyzerConfig {
    AnalyzerConfig::default()
}

/// Parse configuration from a JSON string
pub fn parse_config(json: &str) -> serde_json::Result<AnalyzerConfig> {
    serde_json::from_str(json)
}

/// Load configuration from file if provided.
///
/// A missing or malformed file is reported and the defaults are used.
pub fn load_config(config_path: Option<&Path>) -> AnalyzerConfig {
    let path = match config_path {
        Some(path) => path,
        None => return default_config(),
    };

    if !path.exists() {
        error!("Configuration file not found: {}", path.display());
        return default_config();
    }

    let config_str = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!("Cannot read configuration file {}: {}", path.display(), e);
            return default_config();
        }
    };

    match parse_config(&config_str) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            error!("Invalid JSON in configuration file: {}", e);
            default_config()
        }
    }
}
