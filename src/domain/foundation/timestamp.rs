//! UTC timestamps with the calendar arithmetic billing cycles need.

use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

/// Largest span `chrono::Duration::seconds` accepts.
const MAX_DURATION_SECS: u64 = (i64::MAX / 1_000) as u64;

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Processor timestamps are Unix seconds. Out-of-range values yield `None`.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        Utc.timestamp_opt(secs, 0).single().map(Self)
    }

    pub fn as_unix_secs(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Negative values subtract days. `None` when the result falls outside
    /// the representable calendar.
    pub fn checked_add_days(&self, days: i64) -> Option<Self> {
        days.checked_mul(SECONDS_PER_DAY)
            .filter(|secs| secs.unsigned_abs() <= MAX_DURATION_SECS)
            .and_then(|secs| self.0.checked_add_signed(Duration::seconds(secs)))
            .map(Self)
    }

    /// Calendar-month addition. Day-of-month is clamped to the target month,
    /// so Jan 31 + 1 month lands on the last day of February.
    pub fn checked_add_months(&self, months: u32) -> Option<Self> {
        self.0.checked_add_months(Months::new(months)).map(Self)
    }

    /// Same calendar day at 00:00:00 UTC.
    pub fn start_of_day(&self) -> Self {
        let midnight = self.0.date_naive().and_time(chrono::NaiveTime::MIN);
        Self(Utc.from_utc_datetime(&midnight))
    }

    pub fn earliest(self, other: Timestamp) -> Timestamp {
        std::cmp::min(self, other)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap())
    }

    #[test]
    fn start_of_day_truncates_to_midnight() {
        let ts = at(2024, 3, 14, 17, 45).start_of_day();
        assert_eq!(ts, at(2024, 3, 14, 0, 0));
        assert_eq!(ts.as_datetime().hour(), 0);
    }

    #[test]
    fn add_months_uses_calendar_months() {
        assert_eq!(at(2024, 1, 15, 9, 0).checked_add_months(3).unwrap(), at(2024, 4, 15, 9, 0));
        assert_eq!(at(2024, 1, 15, 9, 0).checked_add_months(12).unwrap(), at(2025, 1, 15, 9, 0));
    }

    #[test]
    fn add_months_clamps_day_of_month() {
        let ts = at(2024, 1, 31, 0, 0).checked_add_months(1).unwrap();
        assert_eq!(ts.as_datetime().month(), 2);
        assert_eq!(ts.as_datetime().day(), 29);
    }

    #[test]
    fn add_days_accepts_negative() {
        let ts = at(2024, 3, 1, 0, 0);
        assert_eq!(ts.checked_add_days(-1), Some(at(2024, 2, 29, 0, 0)));
        assert_eq!(ts.checked_add_days(7), Some(at(2024, 3, 8, 0, 0)));
    }

    #[test]
    fn calendar_overflow_is_reported_not_clamped() {
        let ts = at(2024, 3, 1, 0, 0);
        assert_eq!(ts.checked_add_days(i64::MAX), None);
        assert_eq!(ts.checked_add_days(i64::from(u32::MAX)), None);
        assert_eq!(ts.checked_add_days(i64::MIN), None);
        assert_eq!(ts.checked_add_months(u32::MAX), None);
    }

    #[test]
    fn unix_seconds_round_trip() {
        let ts = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        assert_eq!(ts.as_unix_secs(), 1_700_000_000);
    }

    #[test]
    fn earliest_picks_the_smaller() {
        let a = at(2024, 5, 1, 0, 0);
        let b = at(2024, 4, 30, 0, 0);
        assert_eq!(a.earliest(b), b);
        assert_eq!(b.earliest(a), b);
        assert!(b.is_before(&a));
        assert!(a.is_after(&b));
    }
}
