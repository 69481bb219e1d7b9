//! Event bus routing helpers.
//!
//! # Design
//!
//! - Publishing never fails: with no live subscriber the event still lands in the replay ring.
//! - Subscription and replay snapshot happen under the replay lock so no event falls between them.
//! - Lagging subscribers see `BroadcastStreamRecvError::Lagged` and may recover via `backlog_since`.

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;

/// Stream wrapper used by subscribers.
pub type EventStream = BroadcastStream<EventEnvelope>;

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    replay: Arc<Mutex<ReplayRing>>,
}

struct ReplayRing {
    entries: VecDeque<EventEnvelope>,
    capacity: usize,
    next_id: EventId,
}

impl EventBus {
    /// Construct a bus with a custom replay capacity (clamped to at least one).
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        let capacity = replay_capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            replay: Arc::new(Mutex::new(ReplayRing {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                next_id: 1,
            })),
        }
    }

    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        let _replay = self.lock_replay();
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Subscribe and return the buffered events newer than `last_event_id`.
    ///
    /// Events in the returned backlog are never repeated on the stream.
    #[must_use]
    pub fn subscribe_from(&self, last_event_id: EventId) -> (Vec<EventEnvelope>, EventStream) {
        let replay = self.lock_replay();
        let backlog = replay
            .entries
            .iter()
            .filter(|env| env.id > last_event_id)
            .cloned()
            .collect();
        let stream = BroadcastStream::new(self.sender.subscribe());
        drop(replay);
        (backlog, stream)
    }

    /// Publish an event, returning its assigned identifier.
    #[must_use]
    pub fn publish(&self, event: Event) -> EventId {
        let mut replay = self.lock_replay();
        let id = replay.next_id;
        replay.next_id = replay.next_id.saturating_add(1);

        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        if replay.entries.len() == replay.capacity {
            let _ = replay.entries.pop_front();
        }
        replay.entries.push_back(envelope.clone());
        // Ordering on the channel must follow id order, so send under the lock.
        let _ = self.sender.send(envelope);
        drop(replay);
        id
    }

    /// Last event id held in the replay buffer.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_replay().entries.back().map(|env| env.id)
    }

    /// Collect a backlog of events emitted after the specified id.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        self.lock_replay()
            .entries
            .iter()
            .filter(|env| env.id > id)
            .cloned()
            .collect()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn lock_replay(&self) -> MutexGuard<'_, ReplayRing> {
        self.replay.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::SkipReason;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    type TestResult<T> = anyhow::Result<T>;

    fn skipped(path: &str) -> Event {
        Event::FileSkipped {
            path: path.into(),
            reason: SkipReason::NoExtension,
        }
    }

    #[test]
    fn publish_without_subscribers_keeps_replay() {
        let bus = EventBus::with_capacity(4);
        let first = bus.publish(skipped("/in/a"));
        let second = bus.publish(Event::EngineStopped);

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.last_event_id(), Some(second));
        let backlog = bus.backlog_since(first);
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, second);
    }

    #[test]
    fn replay_ring_drops_oldest_entries() {
        let bus = EventBus::with_capacity(2);
        for idx in 0..5 {
            let _ = bus.publish(skipped(&format!("/in/{idx}")));
        }
        let ids: Vec<_> = bus.backlog_since(0).iter().map(|env| env.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn subscribe_streams_new_events() -> TestResult<()> {
        let bus = EventBus::new();
        let mut stream = bus.subscribe();
        let id = bus.publish(skipped("/in/README"));

        let envelope = timeout(Duration::from_secs(1), stream.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("stream closed"))??;
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.event.kind(), "file_skipped");
        Ok(())
    }

    #[tokio::test]
    async fn subscribe_from_splits_backlog_and_live() -> TestResult<()> {
        let bus = EventBus::new();
        let first = bus.publish(skipped("/in/one"));
        let second = bus.publish(skipped("/in/two"));

        let (backlog, mut stream) = bus.subscribe_from(first);
        assert_eq!(backlog.iter().map(|env| env.id).collect::<Vec<_>>(), vec![second]);

        let third = bus.publish(Event::EngineStopped);
        let live = timeout(Duration::from_secs(1), stream.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("stream closed"))??;
        assert_eq!(live.id, third);
        Ok(())
    }
}
