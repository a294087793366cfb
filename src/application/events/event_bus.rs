//! Event Bus for broadcasting monitoring events to subscribers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::events::{EventMessage, MonitoringEvent};
use crate::domain::ports::NotificationPublisher;
use crate::shared::failure::FailureClassification;

const DEFAULT_CAPACITY: usize = 1024;

/// Event bus for broadcasting events to all subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: MonitoringEvent) -> usize {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();
        let line_id = message.event.line_id().to_string();

        match self.sender.send(message) {
            Ok(count) => {
                debug!(event_type, line_id = %line_id, subscribers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, line_id = %line_id, "Event published (no subscribers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.subscriber(None)
    }

    /// Subscriber that only sees events for `line_id`.
    pub fn subscribe_line(&self, line_id: impl Into<String>) -> EventSubscriber {
        self.subscriber(Some(line_id.into()))
    }

    fn subscriber(&self, line_filter: Option<String>) -> EventSubscriber {
        let receiver = self.sender.subscribe();
        let count = self.subscriber_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(total = count, line_filter = ?line_filter, "New event subscriber");

        EventSubscriber {
            receiver,
            line_filter,
            subscriber_count: self.subscriber_count.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationPublisher for EventBus {
    async fn publish(&self, event: MonitoringEvent) -> Result<(), FailureClassification> {
        EventBus::publish(self, event);
        Ok(())
    }
}

/// Event subscriber that receives events from the bus
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
    line_filter: Option<String>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventSubscriber {
    /// `None` once the bus is gone. Lagged messages and events for other
    /// lines are skipped.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) if self.accepts(&msg) => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(missed = count, "Subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return None;
                }
            }
        }
    }

    fn accepts(&self, message: &EventMessage) -> bool {
        self.line_filter
            .as_deref()
            .map_or(true, |line_id| message.event.line_id() == line_id)
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        let prev = self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        info!(remaining = prev.saturating_sub(1), "Event subscriber disconnected");
    }
}

/// Shared event bus type
pub type SharedEventBus = Arc<EventBus>;

/// Create a shared event bus
pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
