//! Shared types for the arcaded API

use arcade_util::{Amount, PlanId, SessionId, StationId, Timestamp};
use serde::{Deserialize, Serialize};

/// Session status. `Terminated` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Terminated,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Terminated | SessionStatus::Cancelled)
    }

    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }
}

/// Fixed-price plan as captured on the session when it was opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTerms {
    pub plan_id: PlanId,
    pub label: String,
    pub price: Amount,
    /// Nominal duration the price covers
    pub duration_minutes: u32,
}

/// The single billing rule of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PricingMode {
    Hourly { rate: Amount },
    FixedPlan(PlanTerms),
}

/// Discount granted at termination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    /// 0..=100
    pub percentage: u8,
    pub reason: String,
}

/// Extension of the planned duration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub minutes_added: u32,
    pub applied_at: Timestamp,
}

/// A pause within a session. `ended_at` is `None` while the pause is ongoing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Other,
}

/// Payment collected at termination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: Amount,
    pub method: PaymentMethod,
}

/// Derived billing figures for a session at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSnapshot {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub as_of: Timestamp,
    pub elapsed_minutes: i64,
    pub paused_minutes: i64,
    pub planned_minutes: u32,
    pub remaining_minutes: i64,
    /// elapsed / planned; may exceed 1.0 on overrun, 0.0 for open-ended sessions
    pub progress_ratio: f64,
    /// Running pre-discount cost while live, final amount once terminated
    pub amount_due: Amount,
    /// Elapsed time came out negative (clock skew or a corrupt pause record)
    /// and was clamped to zero
    pub clamped: bool,
}

impl BillingSnapshot {
    pub fn is_overrun(&self) -> bool {
        self.planned_minutes > 0 && self.elapsed_minutes >= self.planned_minutes as i64
    }
}

/// Threshold warnings raised before the planned end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    FiveMinutes,
    OneMinute,
}

impl WarningKind {
    pub fn minutes_before(&self) -> i64 {
        match self {
            WarningKind::FiveMinutes => 5,
            WarningKind::OneMinute => 1,
        }
    }
}

/// Settled outcome of a terminated session, persisted by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub session_id: SessionId,
    pub station_id: StationId,
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
    pub chargeable_minutes: i64,
    /// Price before discount
    pub gross: Amount,
    pub discount: Option<Discount>,
    pub discount_amount: Amount,
    /// gross - discount_amount
    pub amount_due: Amount,
    pub amount_paid: Amount,
    pub method: PaymentMethod,
    /// Still owed when the payment is partial
    pub outstanding: Amount,
    /// Returned to the customer on overpayment
    pub change: Amount,
}

impl Transaction {
    /// Money the center actually keeps from this transaction
    pub fn collected(&self) -> Amount {
        self.amount_paid - self.change
    }

    pub fn is_fully_paid(&self) -> bool {
        self.outstanding == Amount::ZERO
    }
}

/// Cancellation record, persisted like a transaction but without charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub session_id: SessionId,
    pub station_id: StationId,
    pub started_at: Timestamp,
    pub cancelled_at: Timestamp,
    pub reason: String,
}

/// Session information for the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub station_id: StationId,
    pub status: SessionStatus,
    pub revision: u64,
    pub started_at: Timestamp,
    pub pricing: PricingMode,
    pub extensions: Vec<Extension>,
    pub pause_reason: Option<String>,
    pub billing: BillingSnapshot,
}

/// Station as shown on the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationView {
    pub station_id: StationId,
    pub label: String,
    pub hourly_rate: Amount,
    /// Live session currently occupying the station
    pub occupied_by: Option<SessionId>,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub stations: Vec<StationView>,
    pub sessions: Vec<SessionInfo>,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    /// Settlement records waiting to be written to the store
    pub pending_records: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_mode_serialization() {
        let mode = PricingMode::Hourly {
            rate: Amount::from_cents(2000),
        };
        let json = serde_json::to_string(&mode).unwrap();
        assert!(json.contains("\"mode\":\"hourly\""));
        assert!(json.contains("\"rate\":2000"));

        let plan = PricingMode::FixedPlan(PlanTerms {
            plan_id: PlanId::new("one-hour"),
            label: "1 hour".into(),
            price: Amount::from_cents(2000),
            duration_minutes: 60,
        });
        let json = serde_json::to_string(&plan).unwrap();
        let parsed: PricingMode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, plan);
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Terminated.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(SessionStatus::Active.is_live());
        assert!(SessionStatus::Paused.is_live());
    }

    #[test]
    fn transaction_collected_excludes_change() {
        let tx = Transaction {
            session_id: SessionId::new(),
            station_id: StationId::new("pc-01"),
            started_at: chrono::DateTime::from_timestamp(0, 0).unwrap(),
            ended_at: chrono::DateTime::from_timestamp(3600, 0).unwrap(),
            chargeable_minutes: 60,
            gross: Amount::from_cents(2000),
            discount: None,
            discount_amount: Amount::ZERO,
            amount_due: Amount::from_cents(2000),
            amount_paid: Amount::from_cents(5000),
            method: PaymentMethod::Cash,
            outstanding: Amount::ZERO,
            change: Amount::from_cents(3000),
        };
        assert_eq!(tx.collected(), Amount::from_cents(2000));
        assert!(tx.is_fully_paid());
    }
}
