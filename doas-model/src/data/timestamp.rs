//!
//! Calendar timestamp in UTC with integer-second and whole-day arithmetic.
//!

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::fmt::Display;

/// A timestamp in UTC, to millisecond precision. Backed by [chrono]'s [DateTime], but
/// kept as a distinct type so the rest of the model only depends on the operations the
/// pipeline actually needs (difference in seconds, increment/decrement by whole units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Constructs a timestamp from calendar fields. Returns `None` if the fields do
    /// not form a valid date/time (e.g. day 31 in February).
    pub fn from_ymd_hms_milli(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        millisecond: u32,
    ) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = NaiveTime::from_hms_milli_opt(hour, minute, second, millisecond)?;
        Some(Self(DateTime::from_naive_utc_and_offset(
            NaiveDateTime::new(date, time),
            Utc,
        )))
    }

    /// Wraps an existing [DateTime]<[Utc]>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    /// Difference `self - other` in whole seconds (can be negative).
    pub fn diff_seconds(&self, other: &Timestamp) -> i64 {
        (self.0 - other.0).num_seconds()
    }

    /// Difference `self - other` as a floating-point number of minutes.
    pub fn diff_minutes(&self, other: &Timestamp) -> f64 {
        (self.0 - other.0).num_milliseconds() as f64 / 60_000.0
    }

    /// Returns `self + seconds`, where `seconds` may be negative.
    pub fn add_seconds(&self, seconds: i64) -> Self {
        Self(self.0 + Duration::seconds(seconds))
    }

    /// Returns `self + days`, handling month/leap-year rollover correctly, since this
    /// simply adds a [Duration] of whole days to the underlying [DateTime].
    pub fn add_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    pub fn is_between(&self, from: &Timestamp, to: &Timestamp) -> bool {
        *self >= *from && *self <= *to
    }

    /// Computes the intersection of two `[from, to]` validity intervals, if any.
    pub fn intersect(a: (Timestamp, Timestamp), b: (Timestamp, Timestamp)) -> Option<(Timestamp, Timestamp)> {
        let from = a.0.max(b.0);
        let to = a.1.min(b.1);
        if from <= to {
            Some((from, to))
        } else {
            None
        }
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y.%m.%dT%H:%M:%S"))
    }
}
