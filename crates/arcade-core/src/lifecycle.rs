//! Session state machine

use arcade_api::{
    BillingSnapshot, Cancellation, Discount, Extension, Payment, PricingMode, SessionInfo,
    SessionStatus, Transaction, TransitionRequest,
};
use arcade_config::BillingRules;
use arcade_store::SessionSnapshot;
use arcade_util::{Amount, SessionId, StationId, Timestamp};
use chrono::TimeDelta;

use crate::{BillingCalculator, CoreError, CoreResult, PauseLedger, PricingResolver, WarningScheduler};

/// What a successful transition did
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Paused {
        reason: String,
    },
    Resumed {
        /// Length of the pause that just ended
        paused_for: TimeDelta,
    },
    Extended {
        minutes_added: u32,
        planned_minutes: u32,
    },
    Terminated(Transaction),
    Cancelled(Cancellation),
}

/// A rented station's session from start to settlement.
///
/// This is the only writer of `status` and the only caller of the
/// [`PauseLedger`] mutators. Transitions are checked in a fixed order:
/// terminal state, event ordering, state misuse, then request
/// preconditions. A rejected transition changes nothing.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    id: SessionId,
    station_id: StationId,
    status: SessionStatus,
    started_at: Timestamp,
    original_planned_minutes: u32,
    pricing: PricingMode,
    extensions: Vec<Extension>,
    ledger: PauseLedger,
    pause_reason: Option<String>,
    revision: u64,
    last_event_at: Timestamp,
    /// Set once the session is terminated or cancelled
    final_snapshot: Option<BillingSnapshot>,
}

impl SessionLifecycle {
    pub fn new(
        id: SessionId,
        station_id: StationId,
        pricing: PricingMode,
        planned_minutes: u32,
        started_at: Timestamp,
    ) -> Self {
        Self {
            id,
            station_id,
            status: SessionStatus::Active,
            started_at,
            original_planned_minutes: planned_minutes,
            pricing,
            extensions: Vec::new(),
            ledger: PauseLedger::new(started_at),
            pause_reason: None,
            revision: 0,
            last_event_at: started_at,
            final_snapshot: None,
        }
    }

    /// Rebuild a live session from a recovery snapshot.
    ///
    /// Returns `None` for terminal records. The status is derived from the
    /// pause intervals so the two always agree.
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Option<Self> {
        if snapshot.status.is_terminal() {
            return None;
        }

        let ledger = PauseLedger::from_intervals(snapshot.started_at, snapshot.pauses.clone());
        let status = if ledger.is_currently_paused() {
            SessionStatus::Paused
        } else {
            SessionStatus::Active
        };

        Some(Self {
            id: snapshot.session_id,
            station_id: snapshot.station_id.clone(),
            status,
            started_at: snapshot.started_at,
            original_planned_minutes: snapshot.original_planned_minutes,
            pricing: snapshot.pricing.clone(),
            extensions: snapshot.extensions.clone(),
            ledger,
            pause_reason: snapshot.pause_reason.clone().filter(|_| status == SessionStatus::Paused),
            revision: snapshot.revision,
            last_event_at: snapshot.last_event_at,
            final_snapshot: None,
        })
    }

    /// Recovery record for this session and its warning flags
    pub fn to_snapshot(&self, warnings: &WarningScheduler) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            station_id: self.station_id.clone(),
            status: self.status,
            revision: self.revision,
            started_at: self.started_at,
            original_planned_minutes: self.original_planned_minutes,
            pricing: self.pricing.clone(),
            extensions: self.extensions.clone(),
            pauses: self.ledger.intervals().to_vec(),
            pause_reason: self.pause_reason.clone(),
            last_event_at: self.last_event_at,
            five_minute_warned: warnings.five_minute_fired(),
            one_minute_warned: warnings.one_minute_fired(),
            expiry_notified: warnings.expired_fired(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn station_id(&self) -> &StationId {
        &self.station_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn original_planned_minutes(&self) -> u32 {
        self.original_planned_minutes
    }

    /// Original planned minutes plus every extension
    pub fn planned_minutes(&self) -> u32 {
        self.extensions
            .iter()
            .fold(self.original_planned_minutes, |acc, e| {
                acc.saturating_add(e.minutes_added)
            })
    }

    pub fn pricing(&self) -> &PricingMode {
        &self.pricing
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn ledger(&self) -> &PauseLedger {
        &self.ledger
    }

    pub fn pause_reason(&self) -> Option<&str> {
        self.pause_reason.as_deref()
    }

    /// Incremented by every accepted transition
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_event_at(&self) -> Timestamp {
        self.last_event_at
    }

    /// Snapshot frozen at termination or cancellation
    pub fn final_snapshot(&self) -> Option<&BillingSnapshot> {
        self.final_snapshot.as_ref()
    }

    /// When the session reached a terminal state
    pub fn closed_at(&self) -> Option<Timestamp> {
        self.final_snapshot.as_ref().map(|s| s.as_of)
    }

    pub fn to_session_info(&self, billing: BillingSnapshot) -> SessionInfo {
        SessionInfo {
            session_id: self.id,
            station_id: self.station_id.clone(),
            status: self.status,
            revision: self.revision,
            started_at: self.started_at,
            pricing: self.pricing.clone(),
            extensions: self.extensions.clone(),
            pause_reason: self.pause_reason.clone(),
            billing,
        }
    }

    /// Apply a transition request at `at`
    pub fn apply(
        &mut self,
        request: &TransitionRequest,
        at: Timestamp,
        rules: &BillingRules,
    ) -> CoreResult<TransitionOutcome> {
        match request {
            TransitionRequest::Pause { reason } => self.pause(reason, at),
            TransitionRequest::Resume => self.resume(at),
            TransitionRequest::Extend { minutes } => self.extend(*minutes, at, rules),
            TransitionRequest::Terminate { payment, discount } => self
                .terminate(payment, discount.as_ref(), at)
                .map(TransitionOutcome::Terminated),
            TransitionRequest::Cancel { reason } => {
                self.cancel(reason, at).map(TransitionOutcome::Cancelled)
            }
        }
    }

    pub fn pause(&mut self, reason: &str, at: Timestamp) -> CoreResult<TransitionOutcome> {
        self.check_accepting(at)?;
        if self.status == SessionStatus::Paused {
            return Err(CoreError::AlreadyPaused);
        }
        let reason = require_reason(reason)?;

        self.ledger.start_pause(at)?;
        self.status = SessionStatus::Paused;
        self.pause_reason = Some(reason.clone());
        self.accept(at);

        Ok(TransitionOutcome::Paused { reason })
    }

    pub fn resume(&mut self, at: Timestamp) -> CoreResult<TransitionOutcome> {
        self.check_accepting(at)?;
        if self.status != SessionStatus::Paused {
            return Err(CoreError::NotPaused);
        }

        let paused_for = self.ledger.end_pause(at)?;
        self.status = SessionStatus::Active;
        self.pause_reason = None;
        self.accept(at);

        Ok(TransitionOutcome::Resumed { paused_for })
    }

    pub fn extend(
        &mut self,
        minutes: u32,
        at: Timestamp,
        rules: &BillingRules,
    ) -> CoreResult<TransitionOutcome> {
        self.check_accepting(at)?;
        if !rules.accepts_extension(minutes) {
            return Err(CoreError::InvalidPreconditions(format!(
                "extension of {} minutes is outside {}..={}",
                minutes, rules.min_extension_minutes, rules.max_extension_minutes
            )));
        }

        self.extensions.push(Extension {
            minutes_added: minutes,
            applied_at: at,
        });
        self.accept(at);

        Ok(TransitionOutcome::Extended {
            minutes_added: minutes,
            planned_minutes: self.planned_minutes(),
        })
    }

    /// Settle the session. An open pause is closed at `at`.
    pub fn terminate(
        &mut self,
        payment: &Payment,
        discount: Option<&Discount>,
        at: Timestamp,
    ) -> CoreResult<Transaction> {
        self.check_accepting(at)?;
        if payment.amount.is_negative() {
            return Err(CoreError::InvalidPreconditions(format!(
                "payment amount {} is negative",
                payment.amount
            )));
        }
        if let Some(discount) = discount {
            validate_discount(discount)?;
        }

        self.close_pause(at)?;

        let mut snapshot = BillingCalculator::measure(self, at);
        let price = PricingResolver::settle(&self.pricing, snapshot.elapsed_minutes, discount);

        self.status = SessionStatus::Terminated;
        snapshot.status = SessionStatus::Terminated;
        snapshot.amount_due = price.amount_due;
        self.final_snapshot = Some(snapshot.clone());
        self.accept(at);

        Ok(Transaction {
            session_id: self.id,
            station_id: self.station_id.clone(),
            started_at: self.started_at,
            ended_at: at,
            chargeable_minutes: snapshot.elapsed_minutes,
            gross: price.gross,
            discount: discount.cloned(),
            discount_amount: price.discount_amount,
            amount_due: price.amount_due,
            amount_paid: payment.amount,
            method: payment.method,
            outstanding: price.amount_due.saturating_sub(payment.amount),
            change: payment.amount.saturating_sub(price.amount_due),
        })
    }

    /// Close the session without charge. An open pause is closed at `at`.
    pub fn cancel(&mut self, reason: &str, at: Timestamp) -> CoreResult<Cancellation> {
        self.check_accepting(at)?;
        let reason = require_reason(reason)?;

        self.close_pause(at)?;

        let mut snapshot = BillingCalculator::measure(self, at);
        self.status = SessionStatus::Cancelled;
        snapshot.status = SessionStatus::Cancelled;
        snapshot.amount_due = Amount::ZERO;
        self.final_snapshot = Some(snapshot);
        self.accept(at);

        Ok(Cancellation {
            session_id: self.id,
            station_id: self.station_id.clone(),
            started_at: self.started_at,
            cancelled_at: at,
            reason,
        })
    }

    fn check_accepting(&self, at: Timestamp) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::TerminalState {
                status: self.status,
            });
        }
        if at < self.last_event_at {
            return Err(CoreError::InvalidOrder {
                at,
                previous: self.last_event_at,
            });
        }
        Ok(())
    }

    fn close_pause(&mut self, at: Timestamp) -> CoreResult<()> {
        if self.ledger.is_currently_paused() {
            self.ledger.end_pause(at)?;
            self.pause_reason = None;
        }
        Ok(())
    }

    fn accept(&mut self, at: Timestamp) {
        self.revision += 1;
        self.last_event_at = at;
    }
}

fn require_reason(reason: &str) -> CoreResult<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(CoreError::InvalidPreconditions("reason must not be empty".into()));
    }
    Ok(reason.to_string())
}

fn validate_discount(discount: &Discount) -> CoreResult<()> {
    if discount.percentage > 100 {
        return Err(CoreError::InvalidPreconditions(format!(
            "discount of {}% exceeds 100%",
            discount.percentage
        )));
    }
    if discount.reason.trim().is_empty() {
        return Err(CoreError::InvalidPreconditions(
            "discount reason must not be empty".into(),
        ));
    }
    Ok(())
}
