//! Core billing engine

use arcade_api::{
    BillingSnapshot, Cancellation, HealthStatus, PlanTerms, PricingMode, ServiceStateSnapshot,
    SessionInfo, SessionStatus, StartSession, StationView, Transaction, TransitionRequest,
    API_VERSION,
};
use arcade_config::Tariff;
use arcade_store::{AuditEvent, AuditEventType, RecoverySnapshot, Store, StoreResult};
use arcade_util::{format_minutes, Clock, SessionId, StationId, Timestamp};
use chrono::TimeDelta;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    BillingCalculator, CoreError, CoreEvent, CoreResult, SessionLifecycle, TransitionOutcome,
    WarningEvent, WarningScheduler,
};

/// Result of a session start or an accepted transition
#[derive(Debug, Clone)]
pub struct Applied {
    pub session: SessionInfo,
    /// Present when the transition settled the session
    pub transaction: Option<Transaction>,
    pub events: Vec<CoreEvent>,
}

/// Settlement record waiting to reach the store
#[derive(Debug, Clone, PartialEq)]
enum PendingRecord {
    Transaction(Transaction),
    Cancellation(Cancellation),
}

impl PendingRecord {
    fn session_id(&self) -> SessionId {
        match self {
            PendingRecord::Transaction(tx) => tx.session_id,
            PendingRecord::Cancellation(c) => c.session_id,
        }
    }

    fn status(&self) -> SessionStatus {
        match self {
            PendingRecord::Transaction(_) => SessionStatus::Terminated,
            PendingRecord::Cancellation(_) => SessionStatus::Cancelled,
        }
    }

    fn write(&self, store: &dyn Store) -> StoreResult<bool> {
        match self {
            PendingRecord::Transaction(tx) => store.record_transaction(tx),
            PendingRecord::Cancellation(c) => store.record_cancellation(c),
        }
    }
}

#[derive(Debug)]
struct TrackedSession {
    lifecycle: SessionLifecycle,
    warnings: WarningScheduler,
    /// A clamped snapshot has been reported and clamping has not stopped since
    clamp_reported: bool,
}

impl TrackedSession {
    fn new(lifecycle: SessionLifecycle, warnings: WarningScheduler) -> Self {
        Self {
            lifecycle,
            warnings,
            clamp_reported: false,
        }
    }

    /// Warn once per clamping episode instead of on every snapshot
    fn note_clamp(&mut self, snapshot: &BillingSnapshot) -> Option<AuditEventType> {
        if !snapshot.clamped {
            self.clamp_reported = false;
            return None;
        }
        if self.clamp_reported {
            return None;
        }

        self.clamp_reported = true;
        warn!(
            session_id = %snapshot.session_id,
            paused_minutes = snapshot.paused_minutes,
            "Negative chargeable time clamped to zero"
        );
        Some(AuditEventType::ElapsedClamped {
            session_id: snapshot.session_id,
            paused_minutes: snapshot.paused_minutes,
        })
    }
}

/// The core billing engine.
///
/// Owns every tracked session. All mutation goes through `&mut self`, so a
/// caller sharing the engine must serialize access (the daemon holds it
/// behind a mutex).
pub struct CoreEngine {
    tariff: Tariff,
    store: Arc<dyn Store>,
    calculator: BillingCalculator,
    sessions: HashMap<SessionId, TrackedSession>,
    outbox: Vec<PendingRecord>,
}

impl CoreEngine {
    /// Create a new core engine
    pub fn new(tariff: Tariff, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        info!(
            stations = tariff.stations.len(),
            plans = tariff.plans.len(),
            "Core engine initialized"
        );

        let calculator = BillingCalculator::new(clock);

        let _ = store.append_audit(AuditEvent::at(
            calculator.now(),
            AuditEventType::TariffLoaded {
                station_count: tariff.stations.len(),
                plan_count: tariff.plans.len(),
            },
        ));

        Self {
            tariff,
            store,
            calculator,
            sessions: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    pub fn tariff(&self) -> &Tariff {
        &self.tariff
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn now(&self) -> Timestamp {
        self.calculator.now()
    }

    /// Open a session on a station
    pub fn start_session(&mut self, request: &StartSession) -> CoreResult<Applied> {
        let station = self
            .tariff
            .get_station(&request.station_id)
            .ok_or_else(|| CoreError::UnknownStation(request.station_id.clone()))?;

        if station.disabled {
            return Err(CoreError::InvalidPreconditions(format!(
                "station {} is disabled",
                station.id
            )));
        }

        if let Some(occupant) = self.occupant_of(&station.id) {
            return Err(CoreError::StationOccupied {
                station_id: station.id.clone(),
                session_id: occupant,
            });
        }

        let (pricing, planned_minutes) = match &request.plan_id {
            Some(plan_id) => {
                let plan = self
                    .tariff
                    .get_plan(plan_id)
                    .ok_or_else(|| CoreError::UnknownPlan(plan_id.clone()))?;
                if !plan.offered_on(&station.id) {
                    return Err(CoreError::InvalidPreconditions(format!(
                        "plan {} is not offered on station {}",
                        plan.id, station.id
                    )));
                }
                let terms = PlanTerms {
                    plan_id: plan.id.clone(),
                    label: plan.label.clone(),
                    price: plan.price,
                    duration_minutes: plan.duration_minutes,
                };
                (
                    PricingMode::FixedPlan(terms),
                    request.planned_minutes.unwrap_or(plan.duration_minutes),
                )
            }
            None => (
                PricingMode::Hourly {
                    rate: station.hourly_rate,
                },
                request.planned_minutes.unwrap_or(0),
            ),
        };

        let now = self.calculator.now();
        let lifecycle = SessionLifecycle::new(
            SessionId::new(),
            station.id.clone(),
            pricing,
            planned_minutes,
            now,
        );
        let session_id = lifecycle.id();

        let pricing_label = match lifecycle.pricing() {
            PricingMode::Hourly { .. } => "hourly".to_string(),
            PricingMode::FixedPlan(terms) => terms.plan_id.to_string(),
        };
        self.audit(
            now,
            AuditEventType::SessionStarted {
                session_id,
                station_id: station.id.clone(),
                planned_minutes,
                pricing: pricing_label.clone(),
            },
        );

        info!(
            session_id = %session_id,
            station_id = %station.id,
            planned_minutes,
            pricing = %pricing_label,
            "Session started"
        );

        let event = CoreEvent::SessionStarted {
            session_id,
            station_id: station.id.clone(),
            planned_minutes,
        };

        let session = lifecycle.to_session_info(self.calculator.snapshot(&lifecycle));
        self.sessions.insert(
            session_id,
            TrackedSession::new(lifecycle, WarningScheduler::new()),
        );

        Ok(Applied {
            session,
            transaction: None,
            events: vec![event],
        })
    }

    /// Apply a lifecycle transition.
    ///
    /// When `expected_revision` is set and differs from the session's
    /// current revision the request is rejected as stale.
    pub fn apply(
        &mut self,
        session_id: SessionId,
        expected_revision: Option<u64>,
        request: &TransitionRequest,
    ) -> CoreResult<Applied> {
        let now = self.calculator.now();

        let result = self.apply_at(session_id, expected_revision, request, now);
        if let Err(e) = &result {
            if !matches!(e, CoreError::UnknownSession(_)) {
                self.audit(
                    now,
                    AuditEventType::TransitionRejected {
                        session_id,
                        transition: request.name().to_string(),
                        error: e.to_string(),
                    },
                );
            }
            warn!(
                session_id = %session_id,
                transition = request.name(),
                error = %e,
                "Transition rejected"
            );
        }
        result
    }

    fn apply_at(
        &mut self,
        session_id: SessionId,
        expected_revision: Option<u64>,
        request: &TransitionRequest,
        now: Timestamp,
    ) -> CoreResult<Applied> {
        if !self.sessions.contains_key(&session_id) {
            return Err(match self.settled_status(session_id) {
                Some(status) => CoreError::TerminalState { status },
                None => CoreError::UnknownSession(session_id),
            });
        }
        let tracked = self
            .sessions
            .get_mut(&session_id)
            .ok_or(CoreError::UnknownSession(session_id))?;

        if let Some(expected) = expected_revision {
            let actual = tracked.lifecycle.revision();
            if expected != actual {
                return Err(CoreError::StaleRevision { expected, actual });
            }
        }

        let outcome = tracked
            .lifecycle
            .apply(request, now, &self.tariff.billing)?;

        let mut events = Vec::new();
        let mut transaction = None;
        let mut pending = None;

        let audit = match outcome {
            TransitionOutcome::Paused { reason } => {
                info!(session_id = %session_id, reason = %reason, "Session paused");
                events.push(CoreEvent::SessionPaused {
                    session_id,
                    reason: reason.clone(),
                });
                AuditEventType::SessionPaused { session_id, reason }
            }
            TransitionOutcome::Resumed { paused_for } => {
                let paused_minutes = paused_for.num_minutes();
                info!(
                    session_id = %session_id,
                    paused_for = %format_minutes(paused_minutes),
                    "Session resumed"
                );
                events.push(CoreEvent::SessionResumed { session_id });
                AuditEventType::SessionResumed {
                    session_id,
                    paused_minutes,
                }
            }
            TransitionOutcome::Extended {
                minutes_added,
                planned_minutes,
            } => {
                let snapshot = BillingCalculator::measure(&tracked.lifecycle, now);
                tracked.warnings.on_extended(&snapshot);
                info!(
                    session_id = %session_id,
                    minutes_added,
                    planned = %format_minutes(i64::from(planned_minutes)),
                    remaining = %format_minutes(snapshot.remaining_minutes),
                    "Session extended"
                );
                events.push(CoreEvent::SessionExtended {
                    session_id,
                    minutes_added,
                    planned_minutes,
                });
                AuditEventType::SessionExtended {
                    session_id,
                    minutes_added,
                    planned_minutes,
                }
            }
            TransitionOutcome::Terminated(tx) => {
                info!(
                    session_id = %session_id,
                    chargeable_minutes = tx.chargeable_minutes,
                    amount_due = %tx.amount_due,
                    amount_paid = %tx.amount_paid,
                    "Session terminated"
                );
                events.push(CoreEvent::SessionTerminated {
                    transaction: tx.clone(),
                });
                pending = Some(PendingRecord::Transaction(tx.clone()));
                let audit = AuditEventType::SessionTerminated {
                    session_id,
                    amount_due: tx.amount_due,
                    amount_paid: tx.amount_paid,
                };
                transaction = Some(tx);
                audit
            }
            TransitionOutcome::Cancelled(cancellation) => {
                info!(
                    session_id = %session_id,
                    reason = %cancellation.reason,
                    "Session cancelled"
                );
                let audit = AuditEventType::SessionCancelled {
                    session_id,
                    reason: cancellation.reason.clone(),
                };
                pending = Some(PendingRecord::Cancellation(cancellation.clone()));
                events.push(CoreEvent::SessionCancelled { cancellation });
                audit
            }
        };

        let clamp = tracked
            .lifecycle
            .final_snapshot()
            .cloned()
            .and_then(|frozen| tracked.note_clamp(&frozen));

        let session = tracked
            .lifecycle
            .to_session_info(self.calculator.snapshot(&tracked.lifecycle));

        self.audit(now, audit);
        if let Some(clamp) = clamp {
            self.audit(now, clamp);
        }
        if let Some(record) = pending {
            self.persist(record);
        }

        Ok(Applied {
            session,
            transaction,
            events,
        })
    }

    /// Billing snapshot of one session
    pub fn snapshot(&self, session_id: SessionId) -> CoreResult<BillingSnapshot> {
        self.sessions
            .get(&session_id)
            .map(|t| self.calculator.snapshot(&t.lifecycle))
            .ok_or(CoreError::UnknownSession(session_id))
    }

    pub fn session_info(&self, session_id: SessionId) -> CoreResult<SessionInfo> {
        self.sessions
            .get(&session_id)
            .map(|t| {
                t.lifecycle
                    .to_session_info(self.calculator.snapshot(&t.lifecycle))
            })
            .ok_or(CoreError::UnknownSession(session_id))
    }

    /// Tick the engine: fire due warnings, retry pending records and drop
    /// closed sessions past their retention
    pub fn tick(&mut self) -> Vec<CoreEvent> {
        let now = self.calculator.now();
        let mut events = Vec::new();
        let mut audits = Vec::new();

        for (session_id, tracked) in self.sessions.iter_mut() {
            if tracked.lifecycle.status().is_terminal() {
                continue;
            }

            let snapshot = BillingCalculator::measure(&tracked.lifecycle, now);
            audits.extend(tracked.note_clamp(&snapshot));
            for fired in tracked.warnings.evaluate(&snapshot) {
                match fired {
                    WarningEvent::Warning {
                        kind,
                        remaining_minutes,
                    } => {
                        info!(
                            session_id = %session_id,
                            kind = ?kind,
                            remaining_minutes,
                            "Warning issued"
                        );
                        audits.push(AuditEventType::WarningIssued {
                            session_id: *session_id,
                            kind,
                        });
                        events.push(CoreEvent::Warning {
                            session_id: *session_id,
                            kind,
                            remaining_minutes,
                        });
                    }
                    WarningEvent::Expired => {
                        info!(
                            session_id = %session_id,
                            elapsed_minutes = snapshot.elapsed_minutes,
                            planned_minutes = snapshot.planned_minutes,
                            "Session expired"
                        );
                        audits.push(AuditEventType::SessionExpired {
                            session_id: *session_id,
                            elapsed_minutes: snapshot.elapsed_minutes,
                        });
                        events.push(CoreEvent::Expired {
                            session_id: *session_id,
                            snapshot: snapshot.clone(),
                        });
                    }
                }
            }
        }

        for audit in audits {
            self.audit(now, audit);
        }

        self.flush_outbox();
        self.prune_closed(now);

        events
    }

    /// Stations with their current occupant plus every tracked session
    pub fn get_state(&self) -> ServiceStateSnapshot {
        let stations = self
            .tariff
            .stations
            .iter()
            .map(|station| StationView {
                station_id: station.id.clone(),
                label: station.label.clone(),
                hourly_rate: station.hourly_rate,
                occupied_by: self.occupant_of(&station.id),
            })
            .collect();

        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .values()
            .map(|t| {
                t.lifecycle
                    .to_session_info(self.calculator.snapshot(&t.lifecycle))
            })
            .collect();
        sessions.sort_by_key(|s| s.started_at);

        ServiceStateSnapshot {
            api_version: API_VERSION,
            stations,
            sessions,
        }
    }

    pub fn health(&self) -> HealthStatus {
        let store_ok = self.store.is_healthy();
        HealthStatus {
            live: true,
            ready: store_ok,
            store_ok,
            pending_records: self.outbox.len(),
        }
    }

    /// Settlement records not yet written to the store
    pub fn pending_records(&self) -> usize {
        self.outbox.len()
    }

    pub fn live_session_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|t| t.lifecycle.status().is_live())
            .count()
    }

    /// Recovery record of every live session
    pub fn export_snapshot(&self) -> RecoverySnapshot {
        let mut sessions: Vec<_> = self
            .sessions
            .values()
            .filter(|t| t.lifecycle.status().is_live())
            .map(|t| t.lifecycle.to_snapshot(&t.warnings))
            .collect();
        sessions.sort_by_key(|s| s.started_at);

        RecoverySnapshot {
            timestamp: self.calculator.now(),
            sessions,
        }
    }

    /// Write the recovery snapshot to the store
    pub fn save_snapshot(&self) -> StoreResult<()> {
        let snapshot = self.export_snapshot();
        self.store.save_snapshot(&snapshot)?;
        debug!(sessions = snapshot.sessions.len(), "Recovery snapshot saved");
        Ok(())
    }

    /// Restore live sessions from a recovery snapshot.
    ///
    /// Terminal records, sessions already tracked and sessions on a station
    /// that is already occupied are skipped. Returns the number restored.
    pub fn restore(&mut self, snapshot: &RecoverySnapshot) -> usize {
        let mut restored = 0;

        for record in &snapshot.sessions {
            if self.sessions.contains_key(&record.session_id) {
                continue;
            }
            if let Some(occupant) = self.occupant_of(&record.station_id) {
                warn!(
                    session_id = %record.session_id,
                    station_id = %record.station_id,
                    occupant = %occupant,
                    "Skipping restored session on occupied station"
                );
                continue;
            }
            let Some(lifecycle) = SessionLifecycle::from_snapshot(record) else {
                continue;
            };

            if self.tariff.get_station(lifecycle.station_id()).is_none() {
                warn!(
                    session_id = %record.session_id,
                    station_id = %record.station_id,
                    "Restored session refers to a station no longer in the tariff"
                );
            }

            let mut warnings = WarningScheduler::new();
            warnings.restore_flags(
                record.five_minute_warned,
                record.one_minute_warned,
                record.expiry_notified,
            );

            self.sessions
                .insert(lifecycle.id(), TrackedSession::new(lifecycle, warnings));
            restored += 1;
        }

        if restored > 0 {
            info!(count = restored, "Sessions restored");
            self.audit(
                self.calculator.now(),
                AuditEventType::SessionsRestored { count: restored },
            );
        }

        restored
    }

    fn occupant_of(&self, station_id: &StationId) -> Option<SessionId> {
        self.sessions
            .values()
            .find(|t| t.lifecycle.status().is_live() && t.lifecycle.station_id() == station_id)
            .map(|t| t.lifecycle.id())
    }

    /// Terminal status of a session no longer held in memory, from the
    /// outbox or the store
    fn settled_status(&self, session_id: SessionId) -> Option<SessionStatus> {
        let pending = self.outbox.iter().find(|r| r.session_id() == session_id);
        if let Some(record) = pending {
            return Some(record.status());
        }

        match self.store.get_transaction(&session_id) {
            Ok(Some(_)) => return Some(SessionStatus::Terminated),
            Ok(None) => {}
            Err(e) => warn!(session_id = %session_id, error = %e, "Transaction lookup failed"),
        }
        match self.store.get_cancellation(&session_id) {
            Ok(Some(_)) => Some(SessionStatus::Cancelled),
            Ok(None) => None,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Cancellation lookup failed");
                None
            }
        }
    }

    /// Append an audit record stamped with the engine clock
    pub fn record_audit(&self, event: AuditEventType) -> StoreResult<()> {
        self.store
            .append_audit(AuditEvent::at(self.calculator.now(), event))
    }

    fn audit(&self, at: Timestamp, event: AuditEventType) {
        let _ = self.store.append_audit(AuditEvent::at(at, event));
    }

    /// Write a settlement record, keeping it in the outbox on failure
    fn persist(&mut self, record: PendingRecord) {
        match record.write(self.store.as_ref()) {
            Ok(_) => debug!(session_id = %record.session_id(), "Settlement recorded"),
            Err(e) => {
                warn!(
                    session_id = %record.session_id(),
                    error = %e,
                    "Failed to record settlement, will retry"
                );
                self.outbox.push(record);
            }
        }
    }

    fn flush_outbox(&mut self) {
        if self.outbox.is_empty() {
            return;
        }

        let store = self.store.clone();
        self.outbox.retain(|record| match record.write(store.as_ref()) {
            Ok(_) => {
                info!(session_id = %record.session_id(), "Pending settlement recorded");
                false
            }
            Err(e) => {
                debug!(session_id = %record.session_id(), error = %e, "Settlement still pending");
                true
            }
        });
    }

    fn prune_closed(&mut self, now: Timestamp) {
        let retention = TimeDelta::from_std(self.tariff.service.closed_retention)
            .unwrap_or(TimeDelta::MAX);

        self.sessions.retain(|session_id, tracked| {
            let expired = tracked
                .lifecycle
                .closed_at()
                .is_some_and(|closed| now - closed >= retention);
            if expired {
                debug!(session_id = %session_id, "Closed session pruned");
            }
            !expired
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcade_api::{PauseInterval, Payment, PaymentMethod, SessionStatus, WarningKind};
    use arcade_config::parse_config;
    use arcade_store::{RevenueSummary, SessionSnapshot, SqliteStore, StoreError};
    use arcade_util::{Amount, ManualClock, PlanId};
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    const TARIFF: &str = r#"
        config_version = 1

        [service]
        closed_retention_minutes = 30

        [[stations]]
        id = "pc-01"
        label = "PC 01"
        hourly_rate = "25.00"

        [[stations]]
        id = "pc-02"
        label = "PC 02"
        hourly_rate = "20.00"

        [[stations]]
        id = "ps5-01"
        label = "PS5"
        hourly_rate = "30.00"
        disabled = true

        [[plans]]
        id = "one-hour"
        label = "1 hour"
        price = "18.00"
        duration_minutes = 60
        stations = ["pc-02"]
    "#;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap()
    }

    fn make_engine() -> (CoreEngine, Arc<ManualClock>, Arc<SqliteStore>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let engine = CoreEngine::new(parse_config(TARIFF).unwrap(), store.clone(), clock.clone());
        (engine, clock, store)
    }

    fn start(engine: &mut CoreEngine, station: &str, planned: Option<u32>) -> SessionId {
        engine
            .start_session(&StartSession {
                station_id: StationId::new(station),
                planned_minutes: planned,
                plan_id: None,
            })
            .unwrap()
            .session
            .session_id
    }

    fn terminate(cents: i64) -> TransitionRequest {
        TransitionRequest::Terminate {
            payment: Payment {
                amount: Amount::from_cents(cents),
                method: PaymentMethod::Cash,
            },
            discount: None,
        }
    }

    #[test]
    fn test_start_hourly_session() {
        let (mut engine, _clock, _store) = make_engine();
        let applied = engine
            .start_session(&StartSession {
                station_id: StationId::new("pc-01"),
                planned_minutes: Some(60),
                plan_id: None,
            })
            .unwrap();

        assert_eq!(applied.session.status, SessionStatus::Active);
        assert_eq!(applied.session.billing.planned_minutes, 60);
        assert_eq!(
            applied.session.pricing,
            PricingMode::Hourly {
                rate: Amount::from_cents(2500)
            }
        );
        assert!(matches!(
            applied.events.as_slice(),
            [CoreEvent::SessionStarted { planned_minutes: 60, .. }]
        ));
    }

    #[test]
    fn test_start_rejections() {
        let (mut engine, _clock, _store) = make_engine();

        let unknown = engine.start_session(&StartSession {
            station_id: StationId::new("nope"),
            planned_minutes: None,
            plan_id: None,
        });
        assert!(matches!(unknown, Err(CoreError::UnknownStation(_))));

        let disabled = engine.start_session(&StartSession {
            station_id: StationId::new("ps5-01"),
            planned_minutes: None,
            plan_id: None,
        });
        assert!(matches!(disabled, Err(CoreError::InvalidPreconditions(_))));

        let bad_plan = engine.start_session(&StartSession {
            station_id: StationId::new("pc-01"),
            planned_minutes: None,
            plan_id: Some(PlanId::new("nope")),
        });
        assert!(matches!(bad_plan, Err(CoreError::UnknownPlan(_))));

        let wrong_station = engine.start_session(&StartSession {
            station_id: StationId::new("pc-01"),
            planned_minutes: None,
            plan_id: Some(PlanId::new("one-hour")),
        });
        assert!(matches!(
            wrong_station,
            Err(CoreError::InvalidPreconditions(_))
        ));

        let first = start(&mut engine, "pc-01", Some(60));
        let occupied = engine.start_session(&StartSession {
            station_id: StationId::new("pc-01"),
            planned_minutes: Some(30),
            plan_id: None,
        });
        assert_eq!(
            occupied.unwrap_err(),
            CoreError::StationOccupied {
                station_id: StationId::new("pc-01"),
                session_id: first,
            }
        );
    }

    #[test]
    fn test_plan_session_defaults_to_plan_duration() {
        let (mut engine, clock, store) = make_engine();
        let applied = engine
            .start_session(&StartSession {
                station_id: StationId::new("pc-02"),
                planned_minutes: None,
                plan_id: Some(PlanId::new("one-hour")),
            })
            .unwrap();
        let id = applied.session.session_id;
        assert_eq!(applied.session.billing.planned_minutes, 60);

        clock.advance_minutes(110);
        assert_eq!(engine.snapshot(id).unwrap().amount_due, Amount::from_cents(1800));

        let applied = engine.apply(id, None, &terminate(2000)).unwrap();
        let tx = applied.transaction.unwrap();
        assert_eq!(tx.amount_due, Amount::from_cents(1800));
        assert_eq!(tx.change, Amount::from_cents(200));
        assert!(store.get_transaction(&id).unwrap().is_some());
    }

    #[test]
    fn test_station_free_after_termination() {
        let (mut engine, clock, _store) = make_engine();
        let id = start(&mut engine, "pc-01", Some(60));
        clock.advance_minutes(10);
        engine.apply(id, None, &terminate(500)).unwrap();

        let state = engine.get_state();
        let station = state
            .stations
            .iter()
            .find(|s| s.station_id == StationId::new("pc-01"))
            .unwrap();
        assert_eq!(station.occupied_by, None);

        start(&mut engine, "pc-01", Some(30));
    }

    #[test]
    fn test_double_terminate_records_once() {
        let (mut engine, clock, store) = make_engine();
        let id = start(&mut engine, "pc-02", Some(120));

        clock.advance_minutes(90);
        let discount = arcade_api::Discount {
            percentage: 10,
            reason: "member".into(),
        };
        let first = engine
            .apply(
                id,
                None,
                &TransitionRequest::Terminate {
                    payment: Payment {
                        amount: Amount::from_cents(2700),
                        method: PaymentMethod::Card,
                    },
                    discount: Some(discount),
                },
            )
            .unwrap();
        assert_eq!(first.transaction.unwrap().amount_due, Amount::from_cents(2700));
        let before = engine.snapshot(id).unwrap();

        clock.advance_minutes(5);
        let second = engine.apply(id, None, &terminate(2700));
        assert_eq!(
            second.unwrap_err(),
            CoreError::TerminalState {
                status: SessionStatus::Terminated
            }
        );
        assert_eq!(engine.snapshot(id).unwrap(), before);
        assert_eq!(store.recent_transactions(10).unwrap().len(), 1);
    }

    #[test]
    fn test_stale_revision_rejected() {
        let (mut engine, clock, _store) = make_engine();
        let id = start(&mut engine, "pc-01", Some(60));

        clock.advance_minutes(5);
        let paused = engine
            .apply(id, Some(0), &TransitionRequest::Pause { reason: "food".into() })
            .unwrap();
        assert_eq!(paused.session.revision, 1);

        // A second operator still looking at revision 0
        clock.advance_minutes(1);
        let stale = engine.apply(id, Some(0), &TransitionRequest::Resume);
        assert_eq!(
            stale.unwrap_err(),
            CoreError::StaleRevision {
                expected: 0,
                actual: 1
            }
        );
        assert_eq!(engine.session_info(id).unwrap().status, SessionStatus::Paused);

        engine.apply(id, Some(1), &TransitionRequest::Resume).unwrap();
    }

    #[test]
    fn test_unknown_session() {
        let (mut engine, _clock, _store) = make_engine();
        let id = SessionId::new();
        assert_eq!(
            engine.apply(id, None, &TransitionRequest::Resume).unwrap_err(),
            CoreError::UnknownSession(id)
        );
        assert!(engine.snapshot(id).is_err());
    }

    #[test]
    fn test_clock_going_backwards_rejected() {
        let (mut engine, clock, _store) = make_engine();
        let id = start(&mut engine, "pc-01", Some(60));

        clock.advance_minutes(10);
        engine
            .apply(id, None, &TransitionRequest::Pause { reason: "x".into() })
            .unwrap();

        clock.advance_minutes(-3);
        assert!(matches!(
            engine.apply(id, None, &TransitionRequest::Resume),
            Err(CoreError::InvalidOrder { .. })
        ));
    }

    #[test]
    fn test_warnings_fire_once_across_ticks() {
        let (mut engine, clock, _store) = make_engine();
        let id = start(&mut engine, "pc-01", Some(60));

        clock.advance_minutes(56);
        let events = engine.tick();
        assert_eq!(
            events,
            vec![CoreEvent::Warning {
                session_id: id,
                kind: WarningKind::FiveMinutes,
                remaining_minutes: 4
            }]
        );

        for _ in 0..30 {
            clock.advance(TimeDelta::seconds(1));
            assert!(engine.tick().is_empty());
        }
    }

    #[test]
    fn test_extend_does_not_refire_and_rearms_expiry() {
        let (mut engine, clock, _store) = make_engine();
        let id = start(&mut engine, "pc-01", Some(60));

        clock.advance_minutes(56);
        assert_eq!(engine.tick().len(), 1);

        engine
            .apply(id, None, &TransitionRequest::Extend { minutes: 30 })
            .unwrap();
        let snapshot = engine.snapshot(id).unwrap();
        assert_eq!(snapshot.planned_minutes, 90);
        assert_eq!(snapshot.remaining_minutes, 34);
        assert!(engine.tick().is_empty());

        clock.advance_minutes(29);
        let events = engine.tick();
        assert!(matches!(
            events.as_slice(),
            [CoreEvent::Warning {
                kind: WarningKind::FiveMinutes,
                ..
            }]
        ));

        clock.advance_minutes(5);
        let events = engine.tick();
        assert!(events.iter().any(|e| matches!(e, CoreEvent::Expired { .. })));
    }

    #[test]
    fn test_open_ended_session_never_warns() {
        let (mut engine, clock, _store) = make_engine();
        start(&mut engine, "pc-01", None);

        for _ in 0..300 {
            clock.advance_minutes(1);
            assert!(engine.tick().is_empty());
        }
    }

    #[test]
    fn test_extended_open_ended_session_warns_normally() {
        let (mut engine, clock, _store) = make_engine();
        let id = start(&mut engine, "pc-01", None);

        clock.advance_minutes(28);
        assert!(engine.tick().is_empty());
        engine
            .apply(id, None, &TransitionRequest::Extend { minutes: 30 })
            .unwrap();

        assert_eq!(
            engine.tick(),
            vec![CoreEvent::Warning {
                session_id: id,
                kind: WarningKind::FiveMinutes,
                remaining_minutes: 2,
            }]
        );

        clock.advance_minutes(2);
        let events = engine.tick();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CoreEvent::Expired { .. }));
    }

    #[test]
    fn test_cancel_records_cancellation_without_transaction() {
        let (mut engine, clock, store) = make_engine();
        let id = start(&mut engine, "pc-01", Some(60));
        clock.advance_minutes(2);

        let applied = engine
            .apply(
                id,
                None,
                &TransitionRequest::Cancel {
                    reason: "wrong station".into(),
                },
            )
            .unwrap();
        assert!(applied.transaction.is_none());
        assert_eq!(applied.session.status, SessionStatus::Cancelled);
        assert_eq!(applied.session.billing.amount_due, Amount::ZERO);
        assert!(store.get_transaction(&id).unwrap().is_none());
    }

    #[test]
    fn test_closed_sessions_pruned_after_retention() {
        let (mut engine, clock, _store) = make_engine();
        let id = start(&mut engine, "pc-01", Some(60));
        clock.advance_minutes(10);
        engine.apply(id, None, &terminate(417)).unwrap();

        clock.advance_minutes(29);
        engine.tick();
        assert!(engine.snapshot(id).is_ok());

        clock.advance_minutes(1);
        engine.tick();
        assert_eq!(engine.snapshot(id).unwrap_err(), CoreError::UnknownSession(id));
    }

    #[test]
    fn test_pruned_sessions_stay_terminal() {
        let (mut engine, clock, store) = make_engine();
        let terminated = start(&mut engine, "pc-01", Some(60));
        let cancelled = start(&mut engine, "pc-02", Some(60));
        clock.advance_minutes(10);
        engine.apply(terminated, None, &terminate(417)).unwrap();
        engine
            .apply(
                cancelled,
                None,
                &TransitionRequest::Cancel {
                    reason: "wrong station".into(),
                },
            )
            .unwrap();

        clock.advance_minutes(61);
        engine.tick();
        assert_eq!(
            engine.snapshot(terminated).unwrap_err(),
            CoreError::UnknownSession(terminated)
        );

        assert_eq!(
            engine.apply(terminated, None, &terminate(417)).unwrap_err(),
            CoreError::TerminalState {
                status: SessionStatus::Terminated
            }
        );
        assert_eq!(
            engine
                .apply(cancelled, None, &TransitionRequest::Resume)
                .unwrap_err(),
            CoreError::TerminalState {
                status: SessionStatus::Cancelled
            }
        );

        let unknown = SessionId::new();
        assert_eq!(
            engine.apply(unknown, None, &terminate(417)).unwrap_err(),
            CoreError::UnknownSession(unknown)
        );

        let day = t0().date_naive();
        assert_eq!(store.daily_revenue(day).unwrap().transaction_count, 1);
    }

    /// Store whose settlement writes fail while `failing` is set
    struct FlakyStore {
        inner: SqliteStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn check(&self) -> StoreResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StoreError::Database("disk unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    impl Store for FlakyStore {
        fn append_audit(&self, event: AuditEvent) -> StoreResult<()> {
            self.inner.append_audit(event)
        }
        fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
            self.inner.get_recent_audits(limit)
        }
        fn record_transaction(&self, transaction: &Transaction) -> StoreResult<bool> {
            self.check()?;
            self.inner.record_transaction(transaction)
        }
        fn get_transaction(&self, session_id: &SessionId) -> StoreResult<Option<Transaction>> {
            self.inner.get_transaction(session_id)
        }
        fn recent_transactions(&self, limit: usize) -> StoreResult<Vec<Transaction>> {
            self.inner.recent_transactions(limit)
        }
        fn record_cancellation(&self, cancellation: &Cancellation) -> StoreResult<bool> {
            self.check()?;
            self.inner.record_cancellation(cancellation)
        }
        fn get_cancellation(&self, session_id: &SessionId) -> StoreResult<Option<Cancellation>> {
            self.inner.get_cancellation(session_id)
        }
        fn daily_revenue(&self, day: NaiveDate) -> StoreResult<RevenueSummary> {
            self.inner.daily_revenue(day)
        }
        fn load_snapshot(&self) -> StoreResult<Option<RecoverySnapshot>> {
            self.inner.load_snapshot()
        }
        fn save_snapshot(&self, snapshot: &RecoverySnapshot) -> StoreResult<()> {
            self.inner.save_snapshot(snapshot)
        }
        fn is_healthy(&self) -> bool {
            !self.failing.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_failed_settlement_retried_from_outbox() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(FlakyStore {
            inner: SqliteStore::in_memory().unwrap(),
            failing: AtomicBool::new(true),
        });
        let mut engine =
            CoreEngine::new(parse_config(TARIFF).unwrap(), store.clone(), clock.clone());

        let id = start(&mut engine, "pc-01", Some(60));
        clock.advance_minutes(30);
        let applied = engine.apply(id, None, &terminate(1250)).unwrap();
        assert_eq!(applied.transaction.unwrap().amount_due, Amount::from_cents(1250));

        assert_eq!(engine.pending_records(), 1);
        assert!(!engine.health().store_ok);
        engine.tick();
        assert_eq!(engine.pending_records(), 1);

        store.failing.store(false, Ordering::SeqCst);
        engine.tick();
        assert_eq!(engine.pending_records(), 0);
        assert!(store.get_transaction(&id).unwrap().is_some());

        // The retry never produces a second charge
        engine.tick();
        assert_eq!(store.recent_transactions(10).unwrap().len(), 1);
    }

    #[test]
    fn test_recovery_snapshot_restores_live_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arcaded.db");
        let clock = Arc::new(ManualClock::new(t0()));

        let (paused_id, closed_id) = {
            let store = Arc::new(SqliteStore::open(&path).unwrap());
            let mut engine =
                CoreEngine::new(parse_config(TARIFF).unwrap(), store, clock.clone());

            let paused_id = start(&mut engine, "pc-01", Some(60));
            let closed_id = start(&mut engine, "pc-02", Some(60));

            clock.advance_minutes(56);
            engine.tick();
            engine
                .apply(paused_id, None, &TransitionRequest::Pause { reason: "break".into() })
                .unwrap();
            engine.apply(closed_id, None, &terminate(2333)).unwrap();

            engine.save_snapshot().unwrap();
            (paused_id, closed_id)
        };

        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let snapshot = store.load_snapshot().unwrap().unwrap();
        let mut engine = CoreEngine::new(parse_config(TARIFF).unwrap(), store, clock.clone());
        assert_eq!(engine.restore(&snapshot), 1);
        assert_eq!(engine.live_session_count(), 1);

        let info = engine.session_info(paused_id).unwrap();
        assert_eq!(info.status, SessionStatus::Paused);
        assert_eq!(info.revision, 1);
        assert!(engine.session_info(closed_id).is_err());

        // Five-minute warning already went out before the restart
        clock.advance_minutes(10);
        engine.apply(paused_id, None, &TransitionRequest::Resume).unwrap();
        assert!(engine.tick().is_empty());
        assert_eq!(engine.snapshot(paused_id).unwrap().elapsed_minutes, 56);
    }

    #[test]
    fn test_clamped_session_reported_once() {
        let (mut engine, clock, store) = make_engine();
        clock.advance_minutes(30);

        // A pause longer than the session itself
        let record = SessionSnapshot {
            session_id: SessionId::new(),
            station_id: StationId::new("pc-01"),
            status: SessionStatus::Active,
            revision: 2,
            started_at: t0(),
            original_planned_minutes: 60,
            pricing: PricingMode::Hourly {
                rate: Amount::from_cents(2000),
            },
            extensions: vec![],
            pauses: vec![PauseInterval {
                started_at: t0(),
                ended_at: Some(t0() + TimeDelta::minutes(90)),
            }],
            pause_reason: None,
            last_event_at: t0(),
            five_minute_warned: false,
            one_minute_warned: false,
            expiry_notified: false,
        };
        let id = record.session_id;
        let snapshot = RecoverySnapshot {
            timestamp: clock.now(),
            sessions: vec![record],
        };
        assert_eq!(engine.restore(&snapshot), 1);

        for _ in 0..3 {
            clock.advance_minutes(1);
            assert!(engine.tick().is_empty());
            assert!(engine.snapshot(id).unwrap().clamped);
        }
        engine.apply(id, None, &terminate(0)).unwrap();

        let clamp_audits = store
            .get_recent_audits(50)
            .unwrap()
            .into_iter()
            .filter(|a| matches!(a.event, AuditEventType::ElapsedClamped { .. }))
            .count();
        assert_eq!(clamp_audits, 1);
    }

    #[test]
    fn test_audit_records_use_engine_clock() {
        let (engine, clock, store) = make_engine();
        clock.advance_minutes(45);

        engine
            .record_audit(AuditEventType::ClientDisconnected {
                client_id: "client-1".into(),
            })
            .unwrap();

        let audits = store.get_recent_audits(10).unwrap();
        let disconnected = audits
            .iter()
            .find(|a| matches!(a.event, AuditEventType::ClientDisconnected { .. }))
            .unwrap();
        assert_eq!(disconnected.timestamp, t0() + TimeDelta::minutes(45));
        assert!(audits.iter().all(|a| a.timestamp <= clock.now()));
    }
}
