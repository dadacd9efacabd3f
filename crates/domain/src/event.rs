//! Event — an immutable record of something that happened to a schedule.
//!
//! Events are produced when the reported state changes, when overrides are
//! added or removed, and after each recompilation.

use serde::{Deserialize, Serialize};

use crate::id::{EventId, ScheduleId};
use crate::time::{WallClock, now};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The active state, its window, or an attribute value changed.
    StateChanged,
    /// An override was set, removed or cleared, or expired overrides were swept.
    OverridesChanged,
    /// The schedule was rebuilt.
    Recompiled,
}

/// A schedule event, as published on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub id: EventId,
    pub event_type: EventType,
    pub schedule_id: Option<ScheduleId>,
    pub data: serde_json::Value,
    pub timestamp: WallClock,
}

impl ScheduleEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(
        event_type: EventType,
        schedule_id: Option<ScheduleId>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            schedule_id,
            data,
            timestamp: now(),
        }
    }
}
