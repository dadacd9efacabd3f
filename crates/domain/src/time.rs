//! Time and wall-clock helpers.
//!
//! The schedule domain is a single repeating day. [`TimeOfDay`] is a
//! wall-clock time without a date; [`WallClock`] is the full local
//! date-time used for "now", override expiry and compilation stamps.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Local wall-clock timestamp (no zone attached).
pub type WallClock = NaiveDateTime;

/// Key under which the TOML deserializer exposes native date/time values.
const TOML_DATETIME_KEY: &str = "$__toml_private_datetime";

/// Return the current local wall-clock time.
#[must_use]
pub fn now() -> WallClock {
    Local::now().naive_local()
}

/// A wall-clock time with no date component, totally ordered.
///
/// [`START_OF_DAY`](Self::START_OF_DAY) is the smallest value and
/// [`END_OF_DAY`](Self::END_OF_DAY) the largest representable instant; the
/// latter is used as the upper bound of ranges that run to midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub const START_OF_DAY: Self = match NaiveTime::from_hms_opt(0, 0, 0) {
        Some(t) => Self(t),
        None => unreachable!(),
    };

    pub const END_OF_DAY: Self = match NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999) {
        Some(t) => Self(t),
        None => unreachable!(),
    };

    /// Build a time from hour, minute and second. Returns `None` when out of range.
    #[must_use]
    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, second).map(Self)
    }

    /// Build a time from hour and minute.
    #[must_use]
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        Self::from_hms(hour, minute, 0)
    }

    #[must_use]
    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    #[must_use]
    pub fn minute(self) -> u32 {
        self.0.minute()
    }

    /// Access the inner [`NaiveTime`].
    #[must_use]
    pub fn as_naive(self) -> NaiveTime {
        self.0
    }

    /// Drop seconds and sub-second precision.
    #[must_use]
    pub fn truncate_to_minute(self) -> Self {
        Self::from_hm(self.hour(), self.minute()).unwrap_or(self)
    }

    /// Shift by a signed number of minutes (fractions allowed).
    ///
    /// This is time-of-day arithmetic: the date component is discarded, so
    /// `23:30 + 60` gives `00:30`. Callers that must keep track of the day
    /// boundary convert to a [`WallClock`] first.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn offset_by_minutes(self, minutes: f64) -> Self {
        let millis = (minutes * 60_000.0).round() as i64;
        let (shifted, _) = self
            .0
            .overflowing_add_signed(TimeDelta::milliseconds(millis));
        Self(shifted)
    }

    /// Parse `HH:MM`, `HH:MM:SS` or `HH:MM:SS.f`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
            .map(Self)
    }

    /// Interpret an already-resolved value as a time of day.
    ///
    /// Accepts, in order: an RFC 3339 datetime (converted to local time), a
    /// naive ISO datetime, a plain time, or a UNIX timestamp (number or numeric
    /// string). Only the time part is kept.
    #[must_use]
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Self::from_text(s),
            serde_json::Value::Number(n) => n.as_f64().and_then(Self::from_timestamp),
            serde_json::Value::Object(map) => map
                .get(TOML_DATETIME_KEY)
                .and_then(serde_json::Value::as_str)
                .and_then(Self::from_text),
            _ => None,
        }
    }

    fn from_text(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Self(dt.with_timezone(&Local).time()));
        }
        let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok());
        if let Some(dt) = naive {
            return Some(Self(dt.time()));
        }
        if let Some(t) = Self::parse(s) {
            return Some(t);
        }
        s.parse::<f64>().ok().and_then(Self::from_timestamp)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_timestamp(secs: f64) -> Option<Self> {
        if !secs.is_finite() {
            return None;
        }
        DateTime::<Utc>::from_timestamp(secs.trunc() as i64, 0)
            .map(|dt| Self(dt.with_timezone(&Local).time()))
    }
}

impl From<NaiveTime> for TimeOfDay {
    fn from(t: NaiveTime) -> Self {
        Self(t)
    }
}

impl From<WallClock> for TimeOfDay {
    fn from(dt: WallClock) -> Self {
        Self(dt.time())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.nanosecond() == 0 {
            write!(f, "{}", self.0.format("%H:%M:%S"))
        } else {
            write!(f, "{}", self.0.format("%H:%M:%S%.f"))
        }
    }
}

/// Error returned when a string is not a recognisable time of day.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day: {0:?}")]
pub struct ParseTimeOfDayError(String);

impl FromStr for TimeOfDay {
    type Err = ParseTimeOfDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ParseTimeOfDayError(s.to_string()))
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseTimeOfDayError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

/// The next wall-clock instant at which `t` occurs, relative to `now`.
///
/// Comparison happens at minute granularity: when `t` is strictly earlier
/// than `now` the occurrence is tomorrow, otherwise today. Seconds are
/// dropped from the result. Returns `None` only at the end of the
/// representable calendar.
#[must_use]
pub fn next_occurrence(now: WallClock, t: TimeOfDay) -> Option<WallClock> {
    let target = t.truncate_to_minute();
    let current = TimeOfDay::from(now).truncate_to_minute();
    let date = if target < current {
        now.date().succ_opt()?
    } else {
        now.date()
    };
    Some(date.and_time(target.as_naive()))
}

/// `now` with seconds and sub-second precision removed.
#[must_use]
pub fn truncate_to_minute(now: WallClock) -> WallClock {
    now.date()
        .and_time(TimeOfDay::from(now).truncate_to_minute().as_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> WallClock {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn tod(h: u32, m: u32) -> TimeOfDay {
        TimeOfDay::from_hm(h, m).unwrap()
    }

    #[test]
    fn should_return_current_local_time() {
        let before = Local::now().naive_local();
        let ts = now();
        let after = Local::now().naive_local();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_order_sentinels_around_every_time() {
        assert!(TimeOfDay::START_OF_DAY < tod(0, 1));
        assert!(tod(23, 59) < TimeOfDay::END_OF_DAY);
        assert_eq!(TimeOfDay::START_OF_DAY.to_string(), "00:00:00");
    }

    #[test]
    fn should_parse_hour_minute_and_seconds_forms() {
        assert_eq!(TimeOfDay::parse("08:30"), Some(tod(8, 30)));
        assert_eq!(TimeOfDay::parse("08:30:15"), TimeOfDay::from_hms(8, 30, 15));
        assert_eq!(TimeOfDay::parse(" 23:00 "), Some(tod(23, 0)));
        assert_eq!(TimeOfDay::parse("25:00"), None);
        assert_eq!(TimeOfDay::parse("soon"), None);
    }

    #[test]
    fn should_roundtrip_end_of_day_through_serde_json() {
        let json = serde_json::to_string(&TimeOfDay::END_OF_DAY).unwrap();
        assert_eq!(json, "\"23:59:59.999999999\"");
        let parsed: TimeOfDay = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TimeOfDay::END_OF_DAY);
    }

    #[test]
    fn should_reject_invalid_time_when_deserializing() {
        let result: Result<TimeOfDay, _> = serde_json::from_str("\"noon\"");
        assert!(result.is_err());
    }

    #[test]
    fn should_offset_by_positive_and_negative_minutes() {
        assert_eq!(tod(8, 0).offset_by_minutes(30.0), tod(8, 30));
        assert_eq!(tod(8, 0).offset_by_minutes(-90.0), tod(6, 30));
        assert_eq!(
            tod(8, 0).offset_by_minutes(0.5),
            TimeOfDay::from_hms(8, 0, 30).unwrap()
        );
    }

    #[test]
    fn should_discard_date_when_offset_crosses_midnight() {
        assert_eq!(tod(23, 30).offset_by_minutes(60.0), tod(0, 30));
        assert_eq!(tod(0, 15).offset_by_minutes(-30.0), tod(23, 45));
    }

    #[test]
    fn should_interpret_value_as_time() {
        let v = serde_json::json!("07:45");
        assert_eq!(TimeOfDay::from_value(&v), Some(tod(7, 45)));

        let v = serde_json::json!("2024-03-10T18:20:00");
        assert_eq!(TimeOfDay::from_value(&v), Some(tod(18, 20)));

        let mut map = serde_json::Map::new();
        map.insert(TOML_DATETIME_KEY.to_string(), serde_json::json!("06:15:00"));
        let v = serde_json::Value::Object(map);
        assert_eq!(TimeOfDay::from_value(&v), Some(tod(6, 15)));

        assert_eq!(TimeOfDay::from_value(&serde_json::json!(true)), None);
        assert_eq!(TimeOfDay::from_value(&serde_json::json!("unknown")), None);
    }

    #[test]
    fn should_interpret_unix_timestamp_in_local_time() {
        let expected = DateTime::<Utc>::from_timestamp(1_700_000_000, 0)
            .unwrap()
            .with_timezone(&Local)
            .time();
        let v = serde_json::json!(1_700_000_000);
        assert_eq!(TimeOfDay::from_value(&v), Some(TimeOfDay::from(expected)));
        let v = serde_json::json!("1700000000");
        assert_eq!(TimeOfDay::from_value(&v), Some(TimeOfDay::from(expected)));
    }

    #[test]
    fn should_pick_today_when_target_is_later() {
        assert_eq!(next_occurrence(at(10, 0), tod(11, 0)), Some(at(11, 0)));
        assert_eq!(next_occurrence(at(10, 0), tod(10, 0)), Some(at(10, 0)));
    }

    #[test]
    fn should_pick_tomorrow_when_target_has_passed() {
        let tomorrow = at(9, 0) + TimeDelta::days(1);
        assert_eq!(next_occurrence(at(10, 0), tod(9, 0)), Some(tomorrow));
    }

    #[test]
    fn should_compare_minutes_not_only_hours() {
        let tomorrow = at(10, 15) + TimeDelta::days(1);
        assert_eq!(next_occurrence(at(10, 45), tod(10, 15)), Some(tomorrow));
    }

    #[test]
    fn should_drop_seconds_when_truncating() {
        let ts = at(10, 5) + TimeDelta::seconds(42);
        assert_eq!(truncate_to_minute(ts), at(10, 5));
    }
}
