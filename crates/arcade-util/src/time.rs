//! Time source for arcaded
//!
//! The billing engine never calls a global `now()`. It asks an injected
//! [`Clock`], which makes time simulable in tests and keeps every duration a
//! plain subtraction of two timestamps.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ARCADE_MOCK_TIME` environment variable moves the
//! starting point of [`SystemClock`] to a fixed UTC time. The clock still
//! advances at the real rate from there.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use std::sync::Mutex;
use std::time::Instant;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ARCADE_MOCK_TIME";

/// Format accepted by [`MOCK_TIME_ENV_VAR`]
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Point in time used throughout the engine. Always UTC; display timezone
/// is a presentation concern.
pub type Timestamp = DateTime<Utc>;

/// The only source of "now" the engine consults
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Monotonic wall clock.
///
/// Reads the system wall clock once, then advances by `Instant` elapsed
/// time, so adjustments of the system clock can never move it backwards.
#[derive(Debug)]
pub struct SystemClock {
    anchor_wall: Timestamp,
    anchor_mono: Instant,
}

impl SystemClock {
    #[allow(clippy::disallowed_methods)] // The one place allowed to read the system time
    pub fn new() -> Self {
        let anchor_wall = mock_time_anchor().unwrap_or_else(Utc::now);
        Self {
            anchor_wall,
            anchor_mono: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = TimeDelta::from_std(self.anchor_mono.elapsed()).unwrap_or(TimeDelta::MAX);
        self.anchor_wall + elapsed
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward, to simulate skew)
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(TimeDelta::minutes(minutes));
    }

    pub fn set(&self, to: Timestamp) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse a mock time string in [`MOCK_TIME_FORMAT`] as UTC
pub fn parse_mock_time(s: &str) -> Option<Timestamp> {
    NaiveDateTime::parse_from_str(s.trim(), MOCK_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn mock_time_anchor() -> Option<Timestamp> {
    #[cfg(debug_assertions)]
    {
        let raw = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
        match parse_mock_time(&raw) {
            Some(ts) => {
                tracing::info!(mock_time = %raw, "Mock time enabled");
                Some(ts)
            }
            None => {
                tracing::warn!(
                    mock_time = %raw,
                    expected_format = MOCK_TIME_FORMAT,
                    "Invalid mock time format"
                );
                None
            }
        }
    }
    #[cfg(not(debug_assertions))]
    {
        None
    }
}

/// Whole minutes in a duration, rounded toward negative infinity
pub fn floor_minutes(d: TimeDelta) -> i64 {
    d.num_seconds().div_euclid(60)
}

/// Helper to format minute counts for log lines and CLI output
pub fn format_minutes(minutes: i64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap()
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(t0());
        assert_eq!(clock.now(), t0());

        clock.advance_minutes(56);
        assert_eq!(clock.now(), t0() + TimeDelta::minutes(56));

        clock.set(t0());
        assert_eq!(clock.now(), t0());
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn floor_minutes_truncates_downward() {
        assert_eq!(floor_minutes(TimeDelta::seconds(59)), 0);
        assert_eq!(floor_minutes(TimeDelta::seconds(60)), 1);
        assert_eq!(floor_minutes(TimeDelta::seconds(3599)), 59);
        assert_eq!(floor_minutes(TimeDelta::seconds(-1)), -1);
    }

    #[test]
    fn parse_mock_time_format() {
        let parsed = parse_mock_time("2025-06-01 14:00:00").unwrap();
        assert_eq!(parsed, t0());

        assert!(parse_mock_time("2025-06-01").is_none());
        assert!(parse_mock_time("14:00:00").is_none());
        assert!(parse_mock_time("not a time").is_none());
    }

    #[test]
    fn format_minutes_output() {
        assert_eq!(format_minutes(5), "5m");
        assert_eq!(format_minutes(61), "1h 1m");
        assert_eq!(format_minutes(120), "2h 0m");
    }
}
