//! Configuration validation

use crate::schema::{RawConfig, RawPlan, RawStation};
use arcade_util::Amount;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Station '{station_id}': {message}")]
    StationError { station_id: String, message: String },

    #[error("Plan '{plan_id}': {message}")]
    PlanError { plan_id: String, message: String },

    #[error("Duplicate station ID: {0}")]
    DuplicateStationId(String),

    #[error("Duplicate plan ID: {0}")]
    DuplicatePlanId(String),

    #[error("Plan '{plan_id}' references unknown station '{station_id}'")]
    UnknownStation { plan_id: String, station_id: String },

    #[error("Billing rules: {0}")]
    BillingError(String),

    #[error("Service config: {0}")]
    ServiceError(String),
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut station_ids = HashSet::new();
    for station in &config.stations {
        if !station_ids.insert(station.id.as_str()) {
            errors.push(ValidationError::DuplicateStationId(station.id.clone()));
        }
        errors.extend(validate_station(station));
    }

    let mut plan_ids = HashSet::new();
    for plan in &config.plans {
        if !plan_ids.insert(plan.id.as_str()) {
            errors.push(ValidationError::DuplicatePlanId(plan.id.clone()));
        }
        errors.extend(validate_plan(plan, &station_ids));
    }

    let min = config.billing.min_extension_minutes.unwrap_or(crate::DEFAULT_MIN_EXTENSION_MINUTES);
    let max = config.billing.max_extension_minutes.unwrap_or(crate::DEFAULT_MAX_EXTENSION_MINUTES);
    if min == 0 {
        errors.push(ValidationError::BillingError(
            "min_extension_minutes must be at least 1".into(),
        ));
    }
    if min > max {
        errors.push(ValidationError::BillingError(format!(
            "min_extension_minutes ({}) exceeds max_extension_minutes ({})",
            min, max
        )));
    }

    if config.service.tick_interval_ms == Some(0) {
        errors.push(ValidationError::ServiceError(
            "tick_interval_ms must be positive".into(),
        ));
    }
    if config.service.snapshot_interval_seconds == Some(0) {
        errors.push(ValidationError::ServiceError(
            "snapshot_interval_seconds must be positive".into(),
        ));
    }

    errors
}

fn validate_station(station: &RawStation) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if station.id.trim().is_empty() {
        errors.push(ValidationError::StationError {
            station_id: station.id.clone(),
            message: "id cannot be empty".into(),
        });
    }

    if let Err(message) = parse_amount(&station.hourly_rate) {
        errors.push(ValidationError::StationError {
            station_id: station.id.clone(),
            message: format!("hourly_rate: {}", message),
        });
    }

    errors
}

fn validate_plan(plan: &RawPlan, station_ids: &HashSet<&str>) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(message) = parse_amount(&plan.price) {
        errors.push(ValidationError::PlanError {
            plan_id: plan.id.clone(),
            message: format!("price: {}", message),
        });
    }

    if plan.duration_minutes == 0 {
        errors.push(ValidationError::PlanError {
            plan_id: plan.id.clone(),
            message: "duration_minutes must be positive".into(),
        });
    }

    if let Some(stations) = &plan.stations {
        for station_id in stations {
            if !station_ids.contains(station_id.as_str()) {
                errors.push(ValidationError::UnknownStation {
                    plan_id: plan.id.clone(),
                    station_id: station_id.clone(),
                });
            }
        }
    }

    errors
}

/// Parse a non-negative decimal amount
pub fn parse_amount(s: &str) -> Result<Amount, String> {
    let amount: Amount = s.parse().map_err(|e: arcade_util::AmountParseError| e.to_string())?;
    if amount.is_negative() {
        return Err(format!("'{}' must not be negative", s));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawBillingRules, RawServiceConfig};

    fn station(id: &str, rate: &str) -> RawStation {
        RawStation {
            id: id.into(),
            label: id.to_uppercase(),
            hourly_rate: rate.into(),
            disabled: false,
        }
    }

    fn config(stations: Vec<RawStation>, plans: Vec<RawPlan>) -> RawConfig {
        RawConfig {
            config_version: 1,
            service: RawServiceConfig::default(),
            billing: RawBillingRules::default(),
            stations,
            plans,
        }
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("20.00").unwrap(), Amount::from_cents(2000));
        assert!(parse_amount("-1.00").is_err());
        assert!(parse_amount("twenty").is_err());
    }

    #[test]
    fn test_duplicate_station_detection() {
        let cfg = config(vec![station("pc-01", "20.00"), station("pc-01", "25.00")], vec![]);
        let errors = validate_config(&cfg);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::DuplicateStationId(_))));
    }

    #[test]
    fn test_bad_rate_and_plan() {
        let cfg = config(
            vec![station("pc-01", "abc")],
            vec![RawPlan {
                id: "night".into(),
                label: "Night".into(),
                price: "50.00".into(),
                duration_minutes: 0,
                stations: Some(vec!["pc-99".into()]),
            }],
        );

        let errors = validate_config(&cfg);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::StationError { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::PlanError { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::UnknownStation { .. })));
    }

    #[test]
    fn test_extension_bounds() {
        let mut cfg = config(vec![station("pc-01", "20.00")], vec![]);
        cfg.billing.min_extension_minutes = Some(60);
        cfg.billing.max_extension_minutes = Some(30);

        let errors = validate_config(&cfg);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::BillingError(_))));
    }

    #[test]
    fn test_valid_config_has_no_errors() {
        let cfg = config(vec![station("pc-01", "20.00"), station("ps5-1", "30")], vec![]);
        assert!(validate_config(&cfg).is_empty());
    }
}
