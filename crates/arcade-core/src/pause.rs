//! Pause accounting for a single session

use arcade_api::PauseInterval;
use arcade_util::{floor_minutes, Timestamp};
use chrono::TimeDelta;

use crate::{CoreError, CoreResult};

/// Ordered, non-overlapping pause intervals of one session.
///
/// At most one interval is open at a time. Only [`crate::SessionLifecycle`]
/// calls the mutators, so the paused status and the billed pause time
/// cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseLedger {
    session_started_at: Timestamp,
    intervals: Vec<PauseInterval>,
}

impl PauseLedger {
    pub fn new(session_started_at: Timestamp) -> Self {
        Self {
            session_started_at,
            intervals: Vec::new(),
        }
    }

    /// Rebuild a ledger from stored intervals.
    ///
    /// No ordering checks are made here; a corrupt record shows up later as
    /// a clamped billing snapshot.
    pub fn from_intervals(session_started_at: Timestamp, intervals: Vec<PauseInterval>) -> Self {
        Self {
            session_started_at,
            intervals,
        }
    }

    pub(crate) fn start_pause(&mut self, at: Timestamp) -> CoreResult<()> {
        if self.is_currently_paused() {
            return Err(CoreError::AlreadyPaused);
        }

        let floor = self
            .intervals
            .last()
            .and_then(|i| i.ended_at)
            .map_or(self.session_started_at, |end| end.max(self.session_started_at));
        if at < floor {
            return Err(CoreError::InvalidOrder { at, previous: floor });
        }

        self.intervals.push(PauseInterval {
            started_at: at,
            ended_at: None,
        });
        Ok(())
    }

    /// Close the open interval and return its length
    pub(crate) fn end_pause(&mut self, at: Timestamp) -> CoreResult<TimeDelta> {
        let open = self
            .intervals
            .last_mut()
            .filter(|i| i.ended_at.is_none())
            .ok_or(CoreError::NotPaused)?;

        if at < open.started_at {
            return Err(CoreError::InvalidOrder {
                at,
                previous: open.started_at,
            });
        }

        open.ended_at = Some(at);
        Ok(at - open.started_at)
    }

    pub fn is_currently_paused(&self) -> bool {
        self.intervals
            .last()
            .is_some_and(|i| i.ended_at.is_none())
    }

    /// Start of the open interval, if any
    pub fn paused_since(&self) -> Option<Timestamp> {
        self.intervals
            .last()
            .filter(|i| i.ended_at.is_none())
            .map(|i| i.started_at)
    }

    /// Closed durations plus the open interval up to `as_of`.
    ///
    /// The open part never counts negative. Closed intervals are summed as
    /// recorded.
    pub fn total_paused(&self, as_of: Timestamp) -> TimeDelta {
        self.intervals
            .iter()
            .map(|i| match i.ended_at {
                Some(end) => end - i.started_at,
                None => (as_of - i.started_at).max(TimeDelta::zero()),
            })
            .fold(TimeDelta::zero(), |acc, d| acc + d)
    }

    pub fn total_paused_minutes(&self, as_of: Timestamp) -> i64 {
        floor_minutes(self.total_paused(as_of))
    }

    pub fn intervals(&self) -> &[PauseInterval] {
        &self.intervals
    }
}
