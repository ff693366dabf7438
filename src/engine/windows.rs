//! Time window utilities
//!
//! All windows are half-open `[start, end)` ranges in UTC.
//! - Day buckets: "YYYY-MM-DD", used for learning streaks
//! - Calendar windows: day, ISO week (Monday start), month

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// Compute the day bucket string for a timestamp.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// let t = Utc.with_ymd_and_hms(2023, 12, 28, 12, 34, 56).unwrap();
/// assert_eq!(lexiquest::engine::windows::day_bucket(t), "2023-12-28");
/// ```
pub fn day_bucket(t: DateTime<Utc>) -> String {
    format!("{:04}-{:02}-{:02}", t.year(), t.month(), t.day())
}

/// Parse a day bucket string back to a date
pub fn parse_day_bucket(bucket: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(bucket, "%Y-%m-%d").ok()
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Midnight (UTC) of the day containing `t`
pub fn day_start(t: DateTime<Utc>) -> DateTime<Utc> {
    midnight(t.date_naive())
}

/// Monday midnight (UTC) of the week containing `t`
pub fn week_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = t.weekday().num_days_from_monday() as i64;
    day_start(t) - Duration::days(days_from_monday)
}

/// First day of the month containing `t`
pub fn month_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(t.year(), t.month(), 1).unwrap_or_else(|| t.date_naive());
    midnight(first)
}

/// First day of the month after the one containing `t`
pub fn next_month_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(midnight)
        .unwrap_or_else(|| month_start(t) + Duration::days(31))
}

pub fn day_window(t: DateTime<Utc>) -> TimeWindow {
    let start = day_start(t);
    TimeWindow {
        start,
        end: start + Duration::days(1),
    }
}

pub fn week_window(t: DateTime<Utc>) -> TimeWindow {
    let start = week_start(t);
    TimeWindow {
        start,
        end: start + Duration::days(7),
    }
}

pub fn month_window(t: DateTime<Utc>) -> TimeWindow {
    TimeWindow {
        start: month_start(t),
        end: next_month_start(t),
    }
}
