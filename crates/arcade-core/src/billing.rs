//! Billing snapshots

use arcade_api::BillingSnapshot;
use arcade_util::{floor_minutes, Clock, Timestamp};
use chrono::TimeDelta;
use std::sync::Arc;
use tracing::trace;

use crate::{PricingResolver, SessionLifecycle};

/// The one place elapsed time and running cost are derived.
///
/// Every consumer (tick loop, IPC queries, settlement) goes through this
/// type, so the dashboard never computes its own figures.
#[derive(Clone)]
pub struct BillingCalculator {
    clock: Arc<dyn Clock>,
}

impl BillingCalculator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Snapshot of `session` at the clock's current time.
    ///
    /// Terminated and cancelled sessions return the snapshot frozen when
    /// they closed.
    pub fn snapshot(&self, session: &SessionLifecycle) -> BillingSnapshot {
        match session.final_snapshot() {
            Some(frozen) => frozen.clone(),
            None => Self::measure(session, self.clock.now()),
        }
    }

    /// Derive the figures of `session` at `as_of`.
    ///
    /// Chargeable time is wall time since start minus all paused time,
    /// including a pause that is still open, so elapsed time is frozen
    /// while paused. It is computed in seconds and floored to minutes once.
    /// A negative result is clamped to zero and flagged.
    pub fn measure(session: &SessionLifecycle, as_of: Timestamp) -> BillingSnapshot {
        let raw = as_of - session.started_at();
        let paused = session.ledger().total_paused(as_of);
        let chargeable = raw - paused;

        let clamped = chargeable < TimeDelta::zero();
        if clamped {
            trace!(
                session_id = %session.id(),
                raw_secs = raw.num_seconds(),
                paused_secs = paused.num_seconds(),
                "Negative chargeable time clamped to zero"
            );
        }

        let elapsed_minutes = floor_minutes(chargeable.max(TimeDelta::zero()));
        let planned_minutes = session.planned_minutes();
        let remaining_minutes = (i64::from(planned_minutes) - elapsed_minutes).max(0);
        let progress_ratio = if planned_minutes > 0 {
            elapsed_minutes as f64 / f64::from(planned_minutes)
        } else {
            0.0
        };

        BillingSnapshot {
            session_id: session.id(),
            status: session.status(),
            as_of,
            elapsed_minutes,
            paused_minutes: floor_minutes(paused.max(TimeDelta::zero())),
            planned_minutes,
            remaining_minutes,
            progress_ratio,
            amount_due: PricingResolver::price_for(session.pricing(), elapsed_minutes),
            clamped,
        }
    }
}
