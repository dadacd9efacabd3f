//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`ScheduleError`] via `#[from]`.

use crate::time::TimeOfDay;

/// Top-level error for schedule operations.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// A request or definition was rejected before doing anything.
    #[error("configuration error")]
    Configuration(#[from] ConfigurationError),

    /// A rule could not be evaluated; it is skipped for this compilation.
    #[error("evaluation error")]
    Evaluation(#[from] EvaluationError),

    /// The compiled schedule is corrupt. Not recoverable by retrying.
    #[error("invariant violation")]
    Invariant(#[from] InvariantViolation),

    /// The requested schedule does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// A persistence adapter failed.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Rejected definitions and override requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// None of start, end and duration was given.
    #[error("at least one of start, end or duration is required")]
    MissingWindow,

    /// Start, end and duration were all given.
    #[error("start, end and duration cannot be provided together")]
    OverSpecified,

    /// Only a start was given.
    #[error("a start without an end requires a duration")]
    MissingDuration,

    /// The resolved end is not after the start and wrapping is not allowed.
    #[error("invalid window: start {start} is not before end {end}")]
    InvalidWindow { start: TimeOfDay, end: TimeOfDay },

    /// Date arithmetic left the representable calendar.
    #[error("resolved time is out of range")]
    OutOfRange,

    /// A schedule must have a non-empty name.
    #[error("name must not be empty")]
    EmptyName,

    /// Two schedules share a name.
    #[error("duplicate schedule name: {0}")]
    DuplicateName(String),
}

/// Soft failures while evaluating a rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    /// The guard condition could not be decided.
    #[error("condition could not be evaluated: {0}")]
    ConditionIndeterminate(String),

    /// A templated value failed to render.
    #[error("failed to resolve {field}: {reason}")]
    Template { field: String, reason: String },

    /// A resolved value does not look like a time.
    #[error("could not interpret {field} value {value} as a time")]
    UnparsableTime { field: String, value: String },

    /// A resolved offset is not a number of minutes.
    #[error("could not interpret {field} value {value} as minutes")]
    UnparsableOffset { field: String, value: String },

    /// The rule wraps past midnight but wrapping is not allowed.
    #[error("start {start} is after end {end} and wrapping is not allowed")]
    WrapNotAllowed { start: TimeOfDay, end: TimeOfDay },
}

/// The compiled partition does not cover a queried instant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("no label claims {at}")]
    Uncovered { at: TimeOfDay },
}

/// A referenced schedule does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_configuration_error_into_schedule_error() {
        let err: ScheduleError = ConfigurationError::OverSpecified.into();
        assert!(matches!(
            err,
            ScheduleError::Configuration(ConfigurationError::OverSpecified)
        ));
    }

    #[test]
    fn should_convert_evaluation_error_into_schedule_error() {
        let err: ScheduleError = EvaluationError::ConditionIndeterminate("x".into()).into();
        assert!(matches!(err, ScheduleError::Evaluation(_)));
    }

    #[test]
    fn should_display_wrap_error_with_times() {
        let err = EvaluationError::WrapNotAllowed {
            start: TimeOfDay::from_hm(23, 0).unwrap(),
            end: TimeOfDay::from_hm(1, 0).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "start 23:00:00 is after end 01:00:00 and wrapping is not allowed"
        );
    }

    #[test]
    fn should_display_not_found_error() {
        let err = NotFoundError {
            entity: "Schedule",
            id: "lights".to_string(),
        };
        assert_eq!(err.to_string(), "Schedule not found: lights");
    }
}
