//! Resolution of an override request into a concrete window.

use chrono::TimeDelta;

use crate::error::ConfigurationError;
use crate::interval::Interval;
use crate::time::{TimeOfDay, WallClock, next_occurrence, truncate_to_minute};

/// Seconds added to the resolved end to obtain the expiry.
const EXPIRY_GRACE_SECONDS: i64 = 30;

/// A resolved override window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    /// Absolute wall-clock instant after which the override is swept.
    pub expires: WallClock,
    /// Whether `end <= start` is to be read as wrapping past midnight.
    pub allow_wrap: bool,
}

impl ResolvedWindow {
    /// The one or two intervals covered by the window (none when degenerate).
    #[must_use]
    pub fn intervals(&self) -> Vec<Interval> {
        Interval::split_day(self.start, self.end, self.allow_wrap).unwrap_or_default()
    }
}

/// Turns `(start?, end?, duration?)` plus "now" into a [`ResolvedWindow`].
///
/// | start | end | duration | window |
/// |---|---|---|---|
/// | – | – | – | rejected |
/// | – | – | ✓ | `[now, now + duration)` |
/// | ✓ | – | ✓ | `[next start, next start + duration)` |
/// | – | ✓ | ✓ | `[next end − duration, next end)` |
/// | – | ✓ | – | `[now, next end)` |
/// | ✓ | ✓ | – | `[next start, next end)`, wrapping per schedule setting |
/// | ✓ | ✓ | ✓ | rejected |
/// | ✓ | – | – | rejected |
///
/// "now" is truncated to the minute; "next T" is the next occurrence of T
/// (see [`next_occurrence`]). Except for the start + end shape, wrapping
/// past midnight is always permitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverrideResolver {
    global_allow_wrap: bool,
}

impl OverrideResolver {
    #[must_use]
    pub fn new(global_allow_wrap: bool) -> Self {
        Self { global_allow_wrap }
    }

    /// Resolve a request relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the combination of inputs is
    /// not one of the supported shapes, or when the window wraps past
    /// midnight and wrapping is not permitted.
    pub fn resolve(
        &self,
        start: Option<TimeOfDay>,
        end: Option<TimeOfDay>,
        duration: Option<u32>,
        now: WallClock,
    ) -> Result<ResolvedWindow, ConfigurationError> {
        let current = truncate_to_minute(now);
        let next = |t: TimeOfDay| next_occurrence(now, t).ok_or(ConfigurationError::OutOfRange);

        let (start_at, end_at, allow_wrap) = match (start, end, duration) {
            (None, None, None) => return Err(ConfigurationError::MissingWindow),
            (Some(_), Some(_), Some(_)) => return Err(ConfigurationError::OverSpecified),
            (Some(_), None, None) => return Err(ConfigurationError::MissingDuration),
            (None, None, Some(minutes)) => (current, shift(current, i64::from(minutes))?, true),
            (Some(s), None, Some(minutes)) => {
                let s = next(s)?;
                (s, shift(s, i64::from(minutes))?, true)
            }
            (None, Some(e), Some(minutes)) => {
                let e = next(e)?;
                (shift(e, -i64::from(minutes))?, e, true)
            }
            (None, Some(e), None) => (current, next(e)?, true),
            (Some(s), Some(e), None) => (next(s)?, next(e)?, self.global_allow_wrap),
        };

        let expires = end_at
            .checked_add_signed(TimeDelta::seconds(EXPIRY_GRACE_SECONDS))
            .ok_or(ConfigurationError::OutOfRange)?;
        let start = TimeOfDay::from(start_at);
        let end = TimeOfDay::from(end_at);

        if end <= start && !allow_wrap {
            return Err(ConfigurationError::InvalidWindow { start, end });
        }

        Ok(ResolvedWindow {
            start,
            end,
            expires,
            allow_wrap,
        })
    }
}

fn shift(at: WallClock, minutes: i64) -> Result<WallClock, ConfigurationError> {
    at.checked_add_signed(TimeDelta::minutes(minutes))
        .ok_or(ConfigurationError::OutOfRange)
}
