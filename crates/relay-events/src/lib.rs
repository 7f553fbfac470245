#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]

//! Notification bus for download engine events.
//!
//! The engine client publishes every push notification it receives; listeners
//! subscribe and react independently. Internally it uses `tokio::broadcast`
//! with a bounded buffer; slow subscribers skip the events they lagged behind on
//! rather than stalling the publisher.

pub mod payloads;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::warn;

pub use payloads::{DownloadEvent, EventId, Gid};

/// Default broadcast capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Metadata wrapper around events with a sequential id and emission time.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned at publish time.
    pub id: EventId,
    /// Time the engine notification was received.
    pub timestamp: DateTime<Utc>,
    /// The notification itself.
    pub event: DownloadEvent,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Construct a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Publish an event, assigning it a sequential identifier.
    ///
    /// Publishing with no live subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: DownloadEvent) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of the bus.
pub struct EventStream {
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event; returns `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged; notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn started(gid: &str) -> DownloadEvent {
        DownloadEvent::Started { gid: Gid::new(gid) }
    }

    #[tokio::test]
    async fn sequential_ids_reach_subscribers() {
        let bus = EventBus::with_capacity(8);
        let mut stream = bus.subscribe();

        let first = bus.publish(started("a"));
        let second = bus.publish(started("b"));
        assert_eq!((first, second), (1, 2));

        let envelope = stream.next().await.expect("first event");
        assert_eq!(envelope.id, 1);
        assert_eq!(envelope.event.gid().as_str(), "a");
        assert_eq!(stream.next().await.expect("second event").id, 2);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let bus = EventBus::with_capacity(2);
        let mut stream = bus.subscribe();
        for index in 0..5 {
            let _ = bus.publish(started(&format!("gid-{index}")));
        }

        let envelope = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("stream should not stall")
            .expect("event after lag");
        assert!(envelope.id >= 4, "oldest events should be dropped");
    }

    #[tokio::test]
    async fn stream_ends_when_bus_dropped() {
        let bus = EventBus::with_capacity(2);
        let mut stream = bus.subscribe();
        drop(bus);
        assert!(stream.next().await.is_none());
    }
}
