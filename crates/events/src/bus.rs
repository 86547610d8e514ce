//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`GenerationEvent`]s.
//! It is designed to be shared via `Arc<EventBus>` across workers, the
//! poller, and the auto-retry handler. Delivery is at-least-once from the
//! subscriber's perspective (a lagged receiver re-reads current state), so
//! handlers must be idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use genflow_core::types::DbId;

// ---------------------------------------------------------------------------
// GenerationEvent
// ---------------------------------------------------------------------------

/// A generation lifecycle event.
///
/// One variant per event kind; subscribers match on the variants they
/// care about and ignore the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// A new generation was accepted at the submission boundary.
    Created {
        generation_id: DbId,
        user_id: DbId,
        provider_id: String,
        operation_type: String,
        timestamp: DateTime<Utc>,
    },
    /// A submission attempt was placed with the provider.
    Submitted {
        generation_id: DbId,
        provider_id: String,
        provider_account_id: DbId,
        retry_attempt: i32,
        timestamp: DateTime<Utc>,
    },
    /// The provider finished the job and the result artifact was stored.
    Completed {
        generation_id: DbId,
        provider_id: String,
        artifact_id: DbId,
        timestamp: DateTime<Utc>,
    },
    /// An attempt failed; the auto-retry handler decides what happens next.
    Failed {
        generation_id: DbId,
        provider_id: String,
        error: String,
        retry_count: i32,
        timestamp: DateTime<Utc>,
    },
}

impl GenerationEvent {
    /// The generation this event concerns.
    pub fn generation_id(&self) -> DbId {
        match self {
            GenerationEvent::Created { generation_id, .. }
            | GenerationEvent::Submitted { generation_id, .. }
            | GenerationEvent::Completed { generation_id, .. }
            | GenerationEvent::Failed { generation_id, .. } => *generation_id,
        }
    }

    /// Dot-separated event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            GenerationEvent::Created { .. } => "job.created",
            GenerationEvent::Submitted { .. } => "job.submitted",
            GenerationEvent::Completed { .. } => "job.completed",
            GenerationEvent::Failed { .. } => "job.failed",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`GenerationEvent`].
pub struct EventBus {
    sender: broadcast::Sender<GenerationEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// durable state lives in the database, not on the bus.
    pub fn publish(&self, event: GenerationEvent) {
        tracing::debug!(
            event = event.name(),
            generation_id = event.generation_id(),
            "Publishing event",
        );
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_event(generation_id: DbId) -> GenerationEvent {
        GenerationEvent::Failed {
            generation_id,
            provider_id: "dreamframe".to_string(),
            error: "timeout".to_string(),
            retry_count: 0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(failed_event(42));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.generation_id(), 42);
        assert_eq!(received.name(), "job.failed");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(failed_event(7));

        assert_eq!(rx1.recv().await.unwrap().generation_id(), 7);
        assert_eq!(rx2.recv().await.unwrap().generation_id(), 7);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        // No subscribers — this must not panic.
        bus.publish(failed_event(1));
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let value = serde_json::to_value(failed_event(9)).unwrap();
        assert_eq!(value["event"], "failed");
        assert_eq!(value["generation_id"], 9);
        assert_eq!(value["error"], "timeout");
    }
}
