//! Event types for arcaded -> client streaming

use arcade_util::{SessionId, StationId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{BillingSnapshot, Cancellation, ServiceStateSnapshot, Transaction, WarningKind, API_VERSION};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on major changes)
    StateChanged(ServiceStateSnapshot),

    SessionStarted {
        session_id: SessionId,
        station_id: StationId,
        planned_minutes: u32,
    },

    SessionPaused {
        session_id: SessionId,
        reason: String,
    },

    SessionResumed {
        session_id: SessionId,
    },

    SessionExtended {
        session_id: SessionId,
        minutes_added: u32,
        planned_minutes: u32,
    },

    /// Remaining time crossed a warning threshold
    WarningIssued {
        session_id: SessionId,
        kind: WarningKind,
        remaining_minutes: i64,
    },

    /// Chargeable time reached the planned duration
    SessionExpired {
        session_id: SessionId,
        snapshot: BillingSnapshot,
    },

    SessionTerminated {
        transaction: Transaction,
    },

    SessionCancelled {
        cancellation: Cancellation,
    },

    /// Service is shutting down
    Shutdown,
}
