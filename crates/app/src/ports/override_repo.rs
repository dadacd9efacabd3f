//! Override repository port — persistence of live overrides.

use std::future::Future;
use std::sync::Arc;

use schedule_state_domain::error::ScheduleError;
use schedule_state_domain::id::ScheduleId;

/// Stores the overrides of each schedule in their persisted shape.
///
/// Records are exchanged as raw mappings so that one malformed record can be
/// dropped without losing the others.
pub trait OverrideRepository {
    /// Load the persisted records of a schedule. An unknown schedule has none.
    fn load(
        &self,
        schedule: ScheduleId,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, ScheduleError>> + Send;

    /// Replace the persisted records of a schedule.
    fn save(
        &self,
        schedule: ScheduleId,
        records: Vec<serde_json::Value>,
    ) -> impl Future<Output = Result<(), ScheduleError>> + Send;
}

impl<T: OverrideRepository + Send + Sync> OverrideRepository for Arc<T> {
    fn load(
        &self,
        schedule: ScheduleId,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, ScheduleError>> + Send {
        (**self).load(schedule)
    }

    fn save(
        &self,
        schedule: ScheduleId,
        records: Vec<serde_json::Value>,
    ) -> impl Future<Output = Result<(), ScheduleError>> + Send {
        (**self).save(schedule, records)
    }
}
