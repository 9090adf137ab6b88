//! Configuration management for the lead engine
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (`LEADFLOW__` prefix, `__` separator)
//!
//! The automation script and the points table are hot-reloadable; the engine
//! snapshots the script per conversation and reads points at award time.

pub mod automation;
pub mod points;
pub mod settings;

pub use automation::AutomationConfig;
pub use points::PointsTable;
pub use settings::{
    load_settings, load_settings_from, AdvisorEntry, ObservabilityConfig, QualificationConfig,
    RuntimeEnvironment, ServerConfig, Settings, SlaConfig, WhatsAppConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
