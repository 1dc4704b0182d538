//! Engine errors

use arcade_api::{ErrorCode, SessionStatus};
use arcade_util::{PlanId, SessionId, StationId, Timestamp};
use thiserror::Error;

/// Errors returned by the lifecycle and the engine.
///
/// Every rejected operation leaves the session untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Session is {status:?} and accepts no further transitions")]
    TerminalState { status: SessionStatus },

    #[error("Session is already paused")]
    AlreadyPaused,

    #[error("Session is not paused")]
    NotPaused,

    #[error("Event at {at} precedes {previous}")]
    InvalidOrder { at: Timestamp, previous: Timestamp },

    #[error("Invalid preconditions: {0}")]
    InvalidPreconditions(String),

    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("Unknown station: {0}")]
    UnknownStation(StationId),

    #[error("Unknown plan: {0}")]
    UnknownPlan(PlanId),

    #[error("Station {station_id} is occupied by session {session_id}")]
    StationOccupied {
        station_id: StationId,
        session_id: SessionId,
    },

    #[error("Stale revision: expected {expected}, session is at {actual}")]
    StaleRevision { expected: u64, actual: u64 },
}

impl CoreError {
    /// Stable protocol code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::TerminalState { .. } => ErrorCode::TerminalState,
            CoreError::AlreadyPaused => ErrorCode::AlreadyPaused,
            CoreError::NotPaused => ErrorCode::NotPaused,
            CoreError::InvalidOrder { .. } => ErrorCode::InvalidOrder,
            CoreError::InvalidPreconditions(_) => ErrorCode::InvalidPreconditions,
            CoreError::UnknownSession(_) => ErrorCode::UnknownSession,
            CoreError::UnknownStation(_) => ErrorCode::UnknownStation,
            CoreError::UnknownPlan(_) => ErrorCode::UnknownPlan,
            CoreError::StationOccupied { .. } => ErrorCode::StationOccupied,
            CoreError::StaleRevision { .. } => ErrorCode::StaleRevision,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
