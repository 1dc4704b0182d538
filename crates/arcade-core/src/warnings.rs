//! Fire-once warning and expiry scheduling

use arcade_api::{BillingSnapshot, WarningKind};

/// Something the scheduler decided to announce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningEvent {
    Warning {
        kind: WarningKind,
        remaining_minutes: i64,
    },
    Expired,
}

/// Per-session fire-once flags.
///
/// Fed a fresh snapshot on every tick, it announces each threshold at most
/// once. Extending a session is the only thing that re-arms them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarningScheduler {
    five_minute_fired: bool,
    one_minute_fired: bool,
    expired_fired: bool,
}

impl WarningScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reinstate flags from a recovery snapshot
    pub fn restore_flags(&mut self, five_minute: bool, one_minute: bool, expired: bool) {
        self.five_minute_fired = five_minute;
        self.one_minute_fired = one_minute;
        self.expired_fired = expired;
    }

    pub fn five_minute_fired(&self) -> bool {
        self.five_minute_fired
    }

    pub fn one_minute_fired(&self) -> bool {
        self.one_minute_fired
    }

    pub fn expired_fired(&self) -> bool {
        self.expired_fired
    }

    /// Events due for `snapshot`, in threshold order.
    ///
    /// Open-ended sessions and closed sessions never fire.
    pub fn evaluate(&mut self, snapshot: &BillingSnapshot) -> Vec<WarningEvent> {
        let mut events = Vec::new();

        if snapshot.planned_minutes == 0 || snapshot.status.is_terminal() {
            return events;
        }

        let remaining = snapshot.remaining_minutes;

        if remaining <= 5 && remaining > 1 && !self.five_minute_fired {
            self.five_minute_fired = true;
            events.push(WarningEvent::Warning {
                kind: WarningKind::FiveMinutes,
                remaining_minutes: remaining,
            });
        }

        if remaining <= 1 && remaining > 0 && !self.one_minute_fired {
            self.one_minute_fired = true;
            events.push(WarningEvent::Warning {
                kind: WarningKind::OneMinute,
                remaining_minutes: remaining,
            });
        }

        if snapshot.elapsed_minutes >= i64::from(snapshot.planned_minutes) && !self.expired_fired {
            self.expired_fired = true;
            events.push(WarningEvent::Expired);
        }

        events
    }

    /// Re-arm after an extension, given a snapshot under the new plan.
    ///
    /// Expiry always re-arms. A warning stays fired only while the new
    /// remaining time is still inside its threshold.
    pub fn on_extended(&mut self, snapshot: &BillingSnapshot) {
        let remaining = snapshot.remaining_minutes;
        self.expired_fired = false;
        self.one_minute_fired &= remaining <= WarningKind::OneMinute.minutes_before();
        self.five_minute_fired &= remaining <= WarningKind::FiveMinutes.minutes_before();
    }
}
