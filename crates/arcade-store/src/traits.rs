//! Store trait definitions

use arcade_api::{
    Cancellation, Extension, PauseInterval, PricingMode, SessionStatus, Transaction,
};
use arcade_util::{Amount, SessionId, StationId, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Settlements

    /// Record a settled transaction. Returns `false` when a transaction for
    /// the same session already exists; the existing record is kept.
    fn record_transaction(&self, transaction: &Transaction) -> StoreResult<bool>;

    fn get_transaction(&self, session_id: &SessionId) -> StoreResult<Option<Transaction>>;

    /// Most recent transactions first
    fn recent_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>>;

    /// Record a cancellation. Returns `false` if one was already recorded.
    fn record_cancellation(&self, cancellation: &Cancellation) -> StoreResult<bool>;

    fn get_cancellation(&self, session_id: &SessionId) -> StoreResult<Option<Cancellation>>;

    /// Money collected from transactions settled on `day` (UTC)
    fn daily_revenue(&self, day: NaiveDate) -> StoreResult<RevenueSummary>;

    // Recovery snapshot

    fn load_snapshot(&self) -> StoreResult<Option<RecoverySnapshot>>;

    fn save_snapshot(&self, snapshot: &RecoverySnapshot) -> StoreResult<()>;

    // Health

    fn is_healthy(&self) -> bool;
}

/// Revenue for one day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevenueSummary {
    pub day: NaiveDate,
    pub total: Amount,
    pub transaction_count: usize,
}

/// Live sessions saved for crash recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySnapshot {
    pub timestamp: Timestamp,
    pub sessions: Vec<SessionSnapshot>,
}

/// Everything needed to rebuild a live session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub station_id: StationId,
    pub status: SessionStatus,
    pub revision: u64,
    pub started_at: Timestamp,
    pub original_planned_minutes: u32,
    pub pricing: PricingMode,
    pub extensions: Vec<Extension>,
    pub pauses: Vec<PauseInterval>,
    pub pause_reason: Option<String>,
    pub last_event_at: Timestamp,
    #[serde(default)]
    pub five_minute_warned: bool,
    #[serde(default)]
    pub one_minute_warned: bool,
    #[serde(default)]
    pub expiry_notified: bool,
}
