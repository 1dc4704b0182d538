//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Billing rules shared by all sessions
    #[serde(default)]
    pub billing: RawBillingRules,

    /// Rentable stations
    #[serde(default)]
    pub stations: Vec<RawStation>,

    /// Fixed-price plans
    #[serde(default)]
    pub plans: Vec<RawPlan>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Engine tick interval in milliseconds (default: 1000)
    pub tick_interval_ms: Option<u64>,

    /// How long finished sessions stay queryable, in minutes (default: 60)
    pub closed_retention_minutes: Option<u32>,

    /// How often live sessions are snapshotted for recovery, in seconds (default: 30)
    pub snapshot_interval_seconds: Option<u64>,
}

/// Billing rules
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawBillingRules {
    /// Smallest accepted extension (default: 5)
    pub min_extension_minutes: Option<u32>,

    /// Largest accepted extension (default: 240)
    pub max_extension_minutes: Option<u32>,
}

/// Raw station definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawStation {
    /// Unique stable ID
    pub id: String,

    /// Display label
    pub label: String,

    /// Hourly rate as a decimal string, e.g. "20.00"
    pub hourly_rate: String,

    /// Station is out of service
    #[serde(default)]
    pub disabled: bool,
}

/// Raw fixed-price plan
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPlan {
    pub id: String,

    pub label: String,

    /// Fixed price as a decimal string
    pub price: String,

    /// Nominal duration the price covers
    pub duration_minutes: u32,

    /// Stations the plan may be used on (default: all)
    #[serde(default)]
    pub stations: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stations_and_plans() {
        let toml_str = r#"
            config_version = 1

            [[stations]]
            id = "pc-01"
            label = "PC 01"
            hourly_rate = "20.00"

            [[plans]]
            id = "one-hour"
            label = "1 hour"
            price = "18.00"
            duration_minutes = 60
            stations = ["pc-01"]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.stations.len(), 1);
        assert_eq!(config.stations[0].hourly_rate, "20.00");
        assert_eq!(config.plans[0].duration_minutes, 60);
        assert_eq!(config.plans[0].stations.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn service_and_billing_sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.service.tick_interval_ms.is_none());
        assert!(config.billing.min_extension_minutes.is_none());
        assert!(config.stations.is_empty());
    }
}
