// ABOUTME: Assistant event types and the broadcast fan-out sink.
// ABOUTME: Publishing is fire-and-forget; slow subscribers never block producers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Events emitted by the dispatcher and the feed pollers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEvent {
    /// A task reached `Succeeded`
    TaskCompleted {
        task_id: String,
        category: String,
        summary: String,
    },
    /// A task reached `Failed`
    TaskFailed {
        task_id: String,
        category: String,
        error: String,
    },
    /// A feed poller delivered a new item
    FeedItem { feed: String, payload: Value },
}

impl AssistantEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::FeedItem { .. } => "feed_item",
        }
    }

    /// Get the task ID if this event is task-related
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskCompleted { task_id, .. } => Some(task_id),
            Self::TaskFailed { task_id, .. } => Some(task_id),
            Self::FeedItem { .. } => None,
        }
    }

    /// Create a TaskCompleted event
    pub fn task_completed(
        task_id: impl Into<String>,
        category: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self::TaskCompleted {
            task_id: task_id.into(),
            category: category.into(),
            summary: summary.into(),
        }
    }

    /// Create a TaskFailed event
    pub fn task_failed(
        task_id: impl Into<String>,
        category: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::TaskFailed {
            task_id: task_id.into(),
            category: category.into(),
            error: error.into(),
        }
    }

    /// Create a FeedItem event
    pub fn feed_item(feed: impl Into<String>, payload: Value) -> Self {
        Self::FeedItem {
            feed: feed.into(),
            payload,
        }
    }
}

/// Fan-out sink for assistant events.
///
/// Backed by a broadcast channel: every subscriber gets every event published
/// after it subscribed, a lagging subscriber observes `Lagged` instead of
/// applying backpressure, and a dropped subscriber never affects the others.
/// Safe for concurrent publication from the dispatcher and all pollers.
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<AssistantEvent>,
}

impl EventSink {
    /// Create a sink with the given per-subscriber buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers, fire-and-forget
    pub fn publish(&self, event: AssistantEvent) {
        crate::metrics::record_event_published(event.event_type());
        // send only errors when there are no subscribers; that is not a failure
        if self.tx.send(event).is_err() {
            tracing::trace!("event published with no subscribers");
        }
    }

    /// Subscribe to events published from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = AssistantEvent::task_completed("task-1", "mailbox", "summarized 3 messages");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("task_completed"));
        assert!(json.contains("task-1"));
        assert!(json.contains("summarized 3 messages"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"feed_item","feed":"share","payload":{"path":"inbox/a.pdf"}}"#;
        let event: AssistantEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, AssistantEvent::FeedItem { .. }));
        assert_eq!(event.event_type(), "feed_item");
        assert_eq!(event.task_id(), None);
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let sink = EventSink::new(8);
        sink.publish(AssistantEvent::task_failed("t", "social", "boom"));
    }

    #[tokio::test]
    async fn test_fan_out_to_multiple_subscribers() {
        let sink = EventSink::new(8);
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();

        sink.publish(AssistantEvent::feed_item("mailbox", json!({"id": 1})));

        assert_eq!(a.recv().await.unwrap().event_type(), "feed_item");
        assert_eq!(b.recv().await.unwrap().event_type(), "feed_item");
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_affect_others() {
        let sink = EventSink::new(8);
        let dropped = sink.subscribe();
        let mut live = sink.subscribe();
        drop(dropped);

        sink.publish(AssistantEvent::feed_item("social", json!({"id": "p1"})));
        let event = live.recv().await.unwrap();
        assert!(matches!(event, AssistantEvent::FeedItem { feed, .. } if feed == "social"));
    }
}
