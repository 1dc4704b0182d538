//! Audit event types

use arcade_api::WarningKind;
use arcade_util::{Amount, SessionId, StationId, Timestamp};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    TariffLoaded {
        station_count: usize,
        plan_count: usize,
    },

    SessionStarted {
        session_id: SessionId,
        station_id: StationId,
        planned_minutes: u32,
        /// "hourly" or the plan id
        pricing: String,
    },

    SessionPaused {
        session_id: SessionId,
        reason: String,
    },

    SessionResumed {
        session_id: SessionId,
        paused_minutes: i64,
    },

    SessionExtended {
        session_id: SessionId,
        minutes_added: u32,
        planned_minutes: u32,
    },

    WarningIssued {
        session_id: SessionId,
        kind: WarningKind,
    },

    SessionExpired {
        session_id: SessionId,
        elapsed_minutes: i64,
    },

    SessionTerminated {
        session_id: SessionId,
        amount_due: Amount,
        amount_paid: Amount,
    },

    SessionCancelled {
        session_id: SessionId,
        reason: String,
    },

    /// Chargeable time came out negative and is being clamped to zero
    ElapsedClamped {
        session_id: SessionId,
        paused_minutes: i64,
    },

    /// A transition request failed validation
    TransitionRejected {
        session_id: SessionId,
        transition: String,
        error: String,
    },

    /// Sessions restored from the recovery snapshot at startup
    SessionsRestored { count: usize },

    ClientConnected {
        client_id: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    pub timestamp: Timestamp,

    pub event: AuditEventType,
}

impl AuditEvent {
    /// Audit event stamped with an engine clock reading
    pub fn at(timestamp: Timestamp, event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }
}
