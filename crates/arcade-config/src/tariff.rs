//! Validated tariff structures

use crate::schema::{RawBillingRules, RawConfig, RawPlan, RawServiceConfig, RawStation};
use crate::validation::parse_amount;
use arcade_util::{default_data_dir, default_socket_path, Amount, PlanId, StationId};
use std::path::PathBuf;
use std::time::Duration;

/// Validated tariff ready for use by the core engine
#[derive(Debug, Clone)]
pub struct Tariff {
    pub service: ServiceConfig,
    pub billing: BillingRules,
    pub stations: Vec<Station>,
    pub plans: Vec<Plan>,
}

impl Tariff {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            billing: BillingRules::from_raw(raw.billing),
            stations: raw.stations.into_iter().map(Station::from_raw).collect(),
            plans: raw.plans.into_iter().map(Plan::from_raw).collect(),
        }
    }

    pub fn get_station(&self, id: &StationId) -> Option<&Station> {
        self.stations.iter().find(|s| &s.id == id)
    }

    pub fn get_plan(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.iter().find(|p| &p.id == id)
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub closed_retention: Duration,
    pub snapshot_interval: Duration,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw.socket_path.unwrap_or_else(default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            tick_interval: Duration::from_millis(raw.tick_interval_ms.unwrap_or(1000)),
            closed_retention: Duration::from_secs(
                raw.closed_retention_minutes.unwrap_or(60) as u64 * 60,
            ),
            snapshot_interval: Duration::from_secs(raw.snapshot_interval_seconds.unwrap_or(30)),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Rules every session is billed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingRules {
    pub min_extension_minutes: u32,
    pub max_extension_minutes: u32,
}

impl BillingRules {
    fn from_raw(raw: RawBillingRules) -> Self {
        Self {
            min_extension_minutes: raw
                .min_extension_minutes
                .unwrap_or(crate::DEFAULT_MIN_EXTENSION_MINUTES),
            max_extension_minutes: raw
                .max_extension_minutes
                .unwrap_or(crate::DEFAULT_MAX_EXTENSION_MINUTES),
        }
    }

    pub fn accepts_extension(&self, minutes: u32) -> bool {
        (self.min_extension_minutes..=self.max_extension_minutes).contains(&minutes)
    }
}

impl Default for BillingRules {
    fn default() -> Self {
        Self::from_raw(RawBillingRules::default())
    }
}

/// A rentable station
#[derive(Debug, Clone)]
pub struct Station {
    pub id: StationId,
    pub label: String,
    pub hourly_rate: Amount,
    pub disabled: bool,
}

impl Station {
    fn from_raw(raw: RawStation) -> Self {
        Self {
            id: StationId::new(raw.id),
            label: raw.label,
            hourly_rate: parse_amount(&raw.hourly_rate).unwrap_or(Amount::ZERO),
            disabled: raw.disabled,
        }
    }
}

/// A fixed-price plan
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: PlanId,
    pub label: String,
    pub price: Amount,
    pub duration_minutes: u32,
    /// None means the plan is offered on every station
    pub stations: Option<Vec<StationId>>,
}

impl Plan {
    fn from_raw(raw: RawPlan) -> Self {
        Self {
            id: PlanId::new(raw.id),
            label: raw.label,
            price: parse_amount(&raw.price).unwrap_or(Amount::ZERO),
            duration_minutes: raw.duration_minutes,
            stations: raw
                .stations
                .map(|ids| ids.into_iter().map(StationId::new).collect()),
        }
    }

    pub fn offered_on(&self, station: &StationId) -> bool {
        match &self.stations {
            Some(ids) => ids.contains(station),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_bounds_are_inclusive() {
        let rules = BillingRules::default();
        assert!(!rules.accepts_extension(4));
        assert!(rules.accepts_extension(5));
        assert!(rules.accepts_extension(240));
        assert!(!rules.accepts_extension(241));
    }

    #[test]
    fn plan_station_restriction() {
        let plan = Plan {
            id: PlanId::new("console-night"),
            label: "Console night".into(),
            price: Amount::from_cents(5000),
            duration_minutes: 240,
            stations: Some(vec![StationId::new("ps5-1")]),
        };
        assert!(plan.offered_on(&StationId::new("ps5-1")));
        assert!(!plan.offered_on(&StationId::new("pc-01")));
    }

    #[test]
    fn service_defaults() {
        let service = ServiceConfig::default();
        assert_eq!(service.tick_interval, Duration::from_secs(1));
        assert_eq!(service.closed_retention, Duration::from_secs(3600));
    }
}
