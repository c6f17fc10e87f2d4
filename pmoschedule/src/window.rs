//! Time-of-day windows
//!
//! A broadcast window is a `[start, end]` pair of times of day. When
//! `start >= end` the window crosses midnight: it covers everything except
//! the open gap `(end, start)`.

use crate::error::{Result, ScheduleError};
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Returns `true` when `time` falls inside the window `[start, end]`.
///
/// - `start < end`: closed interval, `start <= time <= end`.
/// - `start >= end`: the window crosses midnight and is true everywhere
///   except strictly inside `(end, start)`.
///
/// A degenerate window (`start == end`) is therefore always active.
pub fn contains(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start < end {
        start <= time && time <= end
    } else {
        !(end < time && time < start)
    }
}

/// A daily `[start, end]` window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(
        serialize_with = "serialize_time_of_day",
        deserialize_with = "deserialize_time_of_day"
    )]
    pub start: NaiveTime,
    #[serde(
        serialize_with = "serialize_time_of_day",
        deserialize_with = "deserialize_time_of_day"
    )]
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Builds a window from two `HH:MM[:SS]` literals
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self::new(parse_time_of_day(start)?, parse_time_of_day(end)?))
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        contains(time, self.start, self.end)
    }

    pub fn crosses_midnight(&self) -> bool {
        self.start >= self.end
    }
}

/// Parses `HH:MM` or `HH:MM:SS` (fractional seconds are accepted and kept).
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| ScheduleError::InvalidTime(value.to_string()))
}

/// Formats a time of day as `HHMM`, the token used in recording file names
pub fn hhmm(time: NaiveTime) -> String {
    format!("{:02}{:02}", time.hour(), time.minute())
}

pub(crate) fn serialize_time_of_day<S>(time: &NaiveTime, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if time.second() == 0 && time.nanosecond() == 0 {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    } else {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }
}

pub(crate) fn deserialize_time_of_day<'de, D>(deserializer: D) -> std::result::Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_time_of_day(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_closed_interval_bounds() {
        assert!(contains(t(5, 30), t(5, 30), t(10, 0)));
        assert!(contains(t(10, 0), t(5, 30), t(10, 0)));
        assert!(contains(t(7, 0), t(5, 30), t(10, 0)));
        assert!(!contains(t(5, 29), t(5, 30), t(10, 0)));
        assert!(!contains(t(10, 1), t(5, 30), t(10, 0)));
    }

    #[test]
    fn test_window_crossing_midnight() {
        assert!(contains(t(0, 30), t(23, 0), t(1, 0)));
        assert!(contains(t(23, 30), t(23, 0), t(1, 0)));
        assert!(contains(t(23, 0), t(23, 0), t(1, 0)));
        assert!(contains(t(1, 0), t(23, 0), t(1, 0)));
        assert!(!contains(t(12, 0), t(23, 0), t(1, 0)));
        assert!(!contains(t(1, 1), t(23, 0), t(1, 0)));
    }

    #[test]
    fn test_degenerate_window_is_always_active() {
        for hour in 0..24 {
            assert!(contains(t(hour, 17), t(8, 0), t(8, 0)));
        }
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("05:30").unwrap(), t(5, 30));
        assert_eq!(parse_time_of_day(" 23:00:00 ").unwrap(), t(23, 0));
        assert_eq!(
            parse_time_of_day("12:00:30").unwrap(),
            NaiveTime::from_hms_opt(12, 0, 30).unwrap()
        );
        assert!(matches!(
            parse_time_of_day("25:00"),
            Err(ScheduleError::InvalidTime(_))
        ));
        assert!(parse_time_of_day("noon").is_err());
    }

    #[test]
    fn test_hhmm_token() {
        assert_eq!(hhmm(t(5, 30)), "0530");
        assert_eq!(hhmm(NaiveTime::from_hms_opt(10, 0, 59).unwrap()), "1000");
    }
}
