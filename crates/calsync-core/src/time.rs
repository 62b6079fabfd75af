//! Time types for calendar events.
//!
//! [`EventTime`] is the start/end/recurrence-id value of an event (either a
//! specific instant or an all-day date), and [`TimeWindow`] is the range used
//! when listing events from a calendar.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Represents the time of a calendar event.
///
/// Calendar events can have two types of times:
/// - **DateTime**: A specific point in time (stored as UTC)
/// - **AllDay**: A date without a specific time (all-day events)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific datetime, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day event date (no specific time).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a new `EventTime::DateTime` from a UTC datetime.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates a new `EventTime::AllDay` from a date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Converts to a UTC datetime for comparison purposes.
    ///
    /// For all-day events, returns midnight UTC on that date.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => date.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }

    /// Returns a value of the same variant moved to the given instant.
    ///
    /// All-day values keep only the date part of `instant`.
    pub fn with_instant(&self, instant: DateTime<Utc>) -> Self {
        match self {
            Self::DateTime(_) => Self::DateTime(instant),
            Self::AllDay(_) => Self::AllDay(instant.date_naive()),
        }
    }

    /// Shifts the value by a duration, keeping the variant.
    pub fn shifted_by(&self, duration: Duration) -> Self {
        match self {
            Self::DateTime(dt) => Self::DateTime(*dt + duration),
            Self::AllDay(d) => Self::AllDay(*d + Duration::days(duration.num_days())),
        }
    }

    /// Formats the value the way iCalendar writes it (`20250205T100000Z` or `20250205`).
    pub fn to_ics_value(&self) -> String {
        match self {
            Self::DateTime(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            Self::AllDay(d) => d.format("%Y%m%d").to_string(),
        }
    }

    /// Parses an iCalendar DATE or DATE-TIME value.
    ///
    /// Floating and zoned values are read as UTC.
    pub fn parse_ics_value(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.len() == 8 {
            return NaiveDate::parse_from_str(value, "%Y%m%d")
                .ok()
                .map(Self::AllDay);
        }
        NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S")
            .ok()
            .map(|naive| Self::DateTime(naive.and_utc()))
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ics_value())
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime().cmp(&other.to_utc_datetime())
    }
}

/// A time window for listing calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// Creates a time window from a start time and duration.
    pub fn from_duration(start: DateTime<Utc>, duration: Duration) -> Self {
        Self::new(start, start + duration)
    }

    /// Checks if an event with given start and end times overlaps with this window.
    pub fn overlaps_event(&self, event_start: &EventTime, event_end: &EventTime) -> bool {
        let start = event_start.to_utc_datetime();
        let end = event_end.to_utc_datetime();
        start < self.end && end > self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    mod event_time {
        use super::*;

        #[test]
        fn ics_values() {
            let et = EventTime::from_utc(utc(2025, 2, 5, 10, 30, 0));
            assert_eq!(et.to_ics_value(), "20250205T103000Z");
            assert_eq!(EventTime::parse_ics_value("20250205T103000Z"), Some(et));

            let ad = EventTime::from_date(date(2025, 2, 5));
            assert_eq!(ad.to_ics_value(), "20250205");
            assert_eq!(EventTime::parse_ics_value("20250205"), Some(ad));

            assert_eq!(EventTime::parse_ics_value("not a date"), None);
        }

        #[test]
        fn floating_value_is_read_as_utc() {
            assert_eq!(
                EventTime::parse_ics_value("20250205T103000"),
                Some(EventTime::from_utc(utc(2025, 2, 5, 10, 30, 0)))
            );
        }

        #[test]
        fn ordering() {
            let et1 = EventTime::from_utc(utc(2025, 2, 5, 10, 0, 0));
            let et2 = EventTime::from_utc(utc(2025, 2, 5, 11, 0, 0));
            let et3 = EventTime::from_date(date(2025, 2, 5));

            assert!(et3 < et1);
            assert!(et1 < et2);
        }

        #[test]
        fn with_instant_keeps_variant() {
            let target = utc(2025, 3, 1, 9, 0, 0);
            let et = EventTime::from_utc(utc(2025, 2, 5, 10, 0, 0));
            assert_eq!(et.with_instant(target), EventTime::from_utc(target));

            let ad = EventTime::from_date(date(2025, 2, 5));
            assert_eq!(ad.with_instant(target), EventTime::from_date(date(2025, 3, 1)));
        }

        #[test]
        fn shifted_by() {
            let et = EventTime::from_utc(utc(2025, 2, 5, 10, 0, 0));
            assert_eq!(
                et.shifted_by(Duration::minutes(30)),
                EventTime::from_utc(utc(2025, 2, 5, 10, 30, 0))
            );

            let ad = EventTime::from_date(date(2025, 2, 5));
            assert_eq!(
                ad.shifted_by(Duration::days(1)),
                EventTime::from_date(date(2025, 2, 6))
            );
        }

        #[test]
        fn tagged_json() {
            let ad = EventTime::from_date(date(2025, 2, 5));
            let json = serde_json::to_string(&ad).unwrap();
            assert_eq!(json, r#"{"type":"AllDay","value":"2025-02-05"}"#);
            assert_eq!(serde_json::from_str::<EventTime>(&json).unwrap(), ad);
        }
    }

    mod time_window {
        use super::*;

        #[test]
        #[should_panic(expected = "start must be <= end")]
        fn invalid_window() {
            TimeWindow::new(utc(2025, 2, 5, 17, 0, 0), utc(2025, 2, 5, 9, 0, 0));
        }

        #[test]
        fn overlaps_event() {
            let window = TimeWindow::new(utc(2025, 2, 5, 9, 0, 0), utc(2025, 2, 5, 17, 0, 0));

            let start = EventTime::from_utc(utc(2025, 2, 5, 8, 0, 0));
            let end = EventTime::from_utc(utc(2025, 2, 5, 10, 0, 0));
            assert!(window.overlaps_event(&start, &end));

            // Event ends at window start (no overlap)
            let start = EventTime::from_utc(utc(2025, 2, 5, 8, 0, 0));
            let end = EventTime::from_utc(utc(2025, 2, 5, 9, 0, 0));
            assert!(!window.overlaps_event(&start, &end));
        }

        #[test]
        fn all_day_event_covers_its_date() {
            let window = TimeWindow::from_duration(utc(2025, 2, 5, 12, 0, 0), Duration::hours(1));
            let start = EventTime::from_date(date(2025, 2, 5));
            assert!(window.overlaps_event(&start, &start.shifted_by(Duration::days(1))));
            assert!(!window.overlaps_event(&start.shifted_by(Duration::days(1)), &start.shifted_by(Duration::days(2))));
        }
    }
}
