//! In-process schedule event bus backed by a tokio broadcast channel.
//!
//! Subscribers either follow every schedule or a single one. A subscriber
//! that falls behind loses the oldest events; the loss is logged and counted
//! and the subscription keeps going from the oldest event still buffered.

use std::future::Future;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use schedule_state_domain::error::ScheduleError;
use schedule_state_domain::event::ScheduleEvent;
use schedule_state_domain::id::ScheduleId;

use crate::ports::EventPublisher;

/// Event bus shared by every schedule service of the process.
///
/// Publishing succeeds even when nobody listens.
pub struct InProcessEventBus {
    sender: broadcast::Sender<ScheduleEvent>,
}

impl InProcessEventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Follow the events of every schedule, starting now.
    #[must_use]
    pub fn subscribe(&self) -> ScheduleEvents {
        ScheduleEvents {
            receiver: self.sender.subscribe(),
            schedule: None,
            skipped: 0,
        }
    }

    /// Follow the events of one schedule, starting now.
    ///
    /// Events without a schedule id are not delivered.
    #[must_use]
    pub fn subscribe_to(&self, schedule: ScheduleId) -> ScheduleEvents {
        ScheduleEvents {
            receiver: self.sender.subscribe(),
            schedule: Some(schedule),
            skipped: 0,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(
        &self,
        event: ScheduleEvent,
    ) -> impl Future<Output = Result<(), ScheduleError>> + Send {
        let event_type = event.event_type;
        let schedule = event.schedule_id;
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(?event_type, ?schedule, receivers, "event published");
            }
            Err(_) => tracing::trace!(?event_type, ?schedule, "event dropped, no subscriber"),
        }
        async { Ok(()) }
    }
}

/// A subscription to the bus, optionally limited to one schedule.
pub struct ScheduleEvents {
    receiver: broadcast::Receiver<ScheduleEvent>,
    schedule: Option<ScheduleId>,
    skipped: u64,
}

impl ScheduleEvents {
    /// Wait for the next matching event.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ScheduleEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(count)) => self.lagged(count),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<ScheduleEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(count)) => self.lagged(count),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// How many events this subscription lost by falling behind.
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn accepts(&self, event: &ScheduleEvent) -> bool {
        self.schedule
            .is_none_or(|schedule| event.schedule_id == Some(schedule))
    }

    fn lagged(&mut self, count: u64) {
        self.skipped += count;
        tracing::warn!(
            schedule = ?self.schedule,
            count,
            total = self.skipped,
            "subscriber lagged, events lost"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedule_state_domain::event::EventType;

    fn state_changed(schedule: &str, state: &str) -> ScheduleEvent {
        ScheduleEvent::new(
            EventType::StateChanged,
            Some(ScheduleId::from_name(schedule)),
            serde_json::json!({ "state": state }),
        )
    }

    #[tokio::test]
    async fn should_deliver_every_schedule_to_plain_subscription() {
        let bus = InProcessEventBus::new(16);
        let mut events = bus.subscribe();

        bus.publish(state_changed("heating", "comfort")).await.unwrap();
        bus.publish(ScheduleEvent::new(EventType::Recompiled, None, serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(events.recv().await.unwrap().data["state"], "comfort");
        assert_eq!(events.recv().await.unwrap().event_type, EventType::Recompiled);
    }

    #[tokio::test]
    async fn should_deliver_only_the_followed_schedule() {
        let bus = InProcessEventBus::new(16);
        let heating = ScheduleId::from_name("heating");
        let mut events = bus.subscribe_to(heating);

        bus.publish(state_changed("lights", "on")).await.unwrap();
        bus.publish(ScheduleEvent::new(EventType::Recompiled, None, serde_json::json!({})))
            .await
            .unwrap();
        bus.publish(state_changed("heating", "eco")).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.schedule_id, Some(heating));
        assert_eq!(event.data["state"], "eco");
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn should_keep_going_after_falling_behind() {
        let bus = InProcessEventBus::new(2);
        let mut events = bus.subscribe();

        for state in ["a", "b", "c", "d"] {
            bus.publish(state_changed("lights", state)).await.unwrap();
        }

        assert_eq!(events.recv().await.unwrap().data["state"], "c");
        assert_eq!(events.skipped(), 2);
        assert_eq!(events.try_recv().unwrap().data["state"], "d");
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn should_end_subscription_when_bus_is_dropped() {
        let bus = InProcessEventBus::new(4);
        let mut events = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(bus);
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessEventBus::new(16);
        assert!(bus.publish(state_changed("heating", "eco")).await.is_ok());
    }

    #[tokio::test]
    async fn should_not_deliver_events_published_before_subscription() {
        let bus = InProcessEventBus::new(16);
        bus.publish(state_changed("heating", "eco")).await.unwrap();

        let mut events = bus.subscribe();
        bus.publish(state_changed("heating", "comfort")).await.unwrap();

        assert_eq!(events.recv().await.unwrap().data["state"], "comfort");
    }
}
