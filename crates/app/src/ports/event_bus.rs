//! Event bus port — publish/subscribe for schedule events.

use std::future::Future;

use schedule_state_domain::error::ScheduleError;
use schedule_state_domain::event::ScheduleEvent;

/// Publishes schedule events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: ScheduleEvent)
    -> impl Future<Output = Result<(), ScheduleError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        event: ScheduleEvent,
    ) -> impl Future<Output = Result<(), ScheduleError>> + Send {
        (**self).publish(event)
    }
}
