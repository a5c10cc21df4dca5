//! Wall clock abstraction.
//!
//! The engine never calls `Utc::now()` directly; it goes through a
//! [`Clock`] so that tests can pin or advance time (lease expiry, cursor
//! ordering).

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Mutex;

/// Source of the current UTC time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually controlled clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Render a timestamp as fixed-width RFC3339 UTC text.
///
/// The width is fixed (microsecond precision, `Z` suffix) so that
/// lexicographic comparison of stored values matches chronological order,
/// which keyset pagination relies on.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp previously produced by [`format_ts`] (or any valid
/// RFC3339 string).
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_fixed_width_and_ordered() {
        let a = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(5);
        let (fa, fb) = (format_ts(a), format_ts(b));
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
        assert!(fa.ends_with('Z'));
    }

    #[test]
    fn round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(parse_ts(&format_ts(ts)), Some(ts));
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(chrono::Duration::minutes(20));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(20));
    }
}
