//! Tariff configuration parsing and validation for arcaded
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Stations with hourly rates
//! - Fixed-price plans, optionally restricted to some stations
//! - Billing rules (extension bounds) and service settings
//! - Validation that reports every problem at once

mod schema;
mod tariff;
mod validation;

pub use schema::*;
pub use tariff::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

pub const DEFAULT_MIN_EXTENSION_MINUTES: u32 = 5;
pub const DEFAULT_MAX_EXTENSION_MINUTES: u32 = 240;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Tariff> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Tariff> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    let tariff = Tariff::from_raw(raw);
    tracing::debug!(
        stations = tariff.stations.len(),
        plans = tariff.plans.len(),
        "Tariff parsed"
    );
    Ok(tariff)
}
