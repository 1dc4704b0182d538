//! Core events emitted by the engine

use arcade_api::{BillingSnapshot, Cancellation, Transaction, WarningKind};
use arcade_util::{SessionId, StationId};

/// Events emitted by the core engine
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
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

    /// Warning threshold reached
    Warning {
        session_id: SessionId,
        kind: WarningKind,
        remaining_minutes: i64,
    },

    /// Chargeable time reached the planned duration
    Expired {
        session_id: SessionId,
        snapshot: BillingSnapshot,
    },

    SessionTerminated {
        transaction: Transaction,
    },

    SessionCancelled {
        cancellation: Cancellation,
    },
}

impl CoreEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            CoreEvent::SessionStarted { session_id, .. }
            | CoreEvent::SessionPaused { session_id, .. }
            | CoreEvent::SessionResumed { session_id }
            | CoreEvent::SessionExtended { session_id, .. }
            | CoreEvent::Warning { session_id, .. }
            | CoreEvent::Expired { session_id, .. } => *session_id,
            CoreEvent::SessionTerminated { transaction } => transaction.session_id,
            CoreEvent::SessionCancelled { cancellation } => cancellation.session_id,
        }
    }
}
