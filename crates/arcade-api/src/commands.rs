//! Command types for the arcaded protocol

use arcade_util::{Amount, ClientId, PlanId, SessionId, StationId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    BillingSnapshot, Discount, HealthStatus, Payment, ServiceStateSnapshot, SessionInfo,
    Transaction, API_VERSION,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    UnknownSession,
    UnknownStation,
    UnknownPlan,
    StationOccupied,
    TerminalState,
    AlreadyPaused,
    NotPaused,
    InvalidOrder,
    InvalidPreconditions,
    StaleRevision,
    StoreError,
    InternalError,
}

/// Lifecycle events a caller may request for a session.
///
/// This is the closed set of transitions; anything that does not
/// deserialize into one of these is rejected at the protocol boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionRequest {
    Pause {
        reason: String,
    },
    Resume,
    Extend {
        minutes: u32,
    },
    Terminate {
        payment: Payment,
        #[serde(default)]
        discount: Option<Discount>,
    },
    Cancel {
        reason: String,
    },
}

impl TransitionRequest {
    /// Short name for logs and audit records
    pub fn name(&self) -> &'static str {
        match self {
            TransitionRequest::Pause { .. } => "pause",
            TransitionRequest::Resume => "resume",
            TransitionRequest::Extend { .. } => "extend",
            TransitionRequest::Terminate { .. } => "terminate",
            TransitionRequest::Cancel { .. } => "cancel",
        }
    }
}

/// Booking request that opens a session on a station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSession {
    pub station_id: StationId,
    /// Allotted minutes. Defaults to the plan's duration for plan sessions
    /// and to an open-ended session (0) for hourly ones.
    #[serde(default)]
    pub planned_minutes: Option<u32>,
    /// Bill with a fixed-price plan instead of the station's hourly rate
    #[serde(default)]
    pub plan_id: Option<PlanId>,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get stations and all tracked sessions
    GetState,

    /// Open a session on a station
    StartSession(StartSession),

    /// Apply a lifecycle transition.
    ///
    /// `expected_revision`, when set, must match the session's current
    /// revision or the request is rejected as stale.
    Transition {
        session_id: SessionId,
        #[serde(default)]
        expected_revision: Option<u64>,
        request: TransitionRequest,
    },

    /// Current billing snapshot of one session
    GetSnapshot { session_id: SessionId },

    /// Most recently settled transactions
    RecentTransactions { limit: usize },

    /// Revenue collected on a calendar day (UTC)
    DailyRevenue { day: NaiveDate },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,

    GetHealth,

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(ServiceStateSnapshot),
    SessionStarted {
        session: SessionInfo,
    },
    TransitionApplied {
        session: SessionInfo,
        /// Present when the transition settled the session
        transaction: Option<Transaction>,
    },
    Snapshot(BillingSnapshot),
    Transactions {
        transactions: Vec<Transaction>,
    },
    Revenue {
        day: NaiveDate,
        total: Amount,
        transaction_count: usize,
    },
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new() -> Self {
        Self {
            client_id: ClientId::new(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PaymentMethod;

    #[test]
    fn request_serialization() {
        let req = Request::new(1, Command::GetState);
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
        assert!(matches!(parsed.command, Command::GetState));
    }

    #[test]
    fn transition_request_wire_format() {
        let json = r#"{
            "type": "transition",
            "session_id": "6f1c1d7e-9a53-4c8f-8f1e-0f4b1b7f1a11",
            "request": {
                "type": "terminate",
                "payment": { "amount": 2700, "method": "card" },
                "discount": { "percentage": 10, "reason": "loyalty" }
            }
        }"#;

        let command: Command = serde_json::from_str(json).unwrap();
        match command {
            Command::Transition {
                expected_revision,
                request: TransitionRequest::Terminate { payment, discount },
                ..
            } => {
                assert_eq!(expected_revision, None);
                assert_eq!(payment.amount, Amount::from_cents(2700));
                assert_eq!(payment.method, PaymentMethod::Card);
                assert_eq!(discount.unwrap().percentage, 10);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn unknown_transition_is_rejected() {
        let json = r#"{ "type": "teleport", "minutes": 5 }"#;
        assert!(serde_json::from_str::<TransitionRequest>(json).is_err());

        let json = r#"{ "type": "extend" }"#;
        assert!(serde_json::from_str::<TransitionRequest>(json).is_err());
    }

    #[test]
    fn response_error_serialization() {
        let resp = Response::error(7, ErrorInfo::new(ErrorCode::TerminalState, "done"));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("terminal_state"));

        let parsed: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_id, 7);
    }
}
