//! Event bus — broadcast fan-out plus per-session ordered history.
//!
//! Sequence numbers are assigned under the history lock at publish time, so
//! the stored order and the stamped order can never diverge. The broadcast
//! side is lossy under subscriber lag; the history is the replay source.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{DebateEvent, SequencedEvent};

const CHANNEL_CAPACITY: usize = 256;

pub type SharedEventBus = Arc<EventBus>;

/// Pub/sub bus with an in-memory ordered event log per session.
pub struct EventBus {
    sender: broadcast::Sender<SequencedEvent>,
    history: Mutex<HashMap<String, Vec<SequencedEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Stamp, log, and broadcast an event. The observer side is invoked
    /// outside any runtime critical section.
    pub fn publish(&self, event: DebateEvent) -> SequencedEvent {
        let sequenced = {
            let mut history = self.history.lock().expect("event history poisoned");
            let log = history.entry(event.session_id().to_string()).or_default();
            let sequenced = SequencedEvent {
                seq: log.len() as u64,
                event,
            };
            log.push(sequenced.clone());
            sequenced
        };

        // No receivers is fine; history retains the event.
        let receivers = self.sender.send(sequenced.clone()).unwrap_or(0);
        debug!(
            event_type = sequenced.event.event_type(),
            session_id = sequenced.event.session_id(),
            seq = sequenced.seq,
            receivers,
            "event published"
        );
        sequenced
    }

    /// Subscribe to the live stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.sender.subscribe()
    }

    /// Ordered history for one session.
    pub fn history(&self, session_id: &str) -> Vec<SequencedEvent> {
        self.history
            .lock()
            .expect("event history poisoned")
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
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
    use chrono::Utc;

    fn started(session_id: &str) -> DebateEvent {
        DebateEvent::SessionStarted {
            session_id: session_id.to_string(),
            topic: "t".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(started("s1"));
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event.event_type(), "session_started");
        assert_eq!(received.seq, 0);
    }

    #[test]
    fn test_sequences_are_per_session() {
        let bus = EventBus::new();
        bus.publish(started("s1"));
        bus.publish(started("s2"));
        bus.publish(started("s1"));

        let s1 = bus.history("s1");
        let s2 = bus.history("s2");
        assert_eq!(s1.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(s2.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_history_preserves_order() {
        let bus = EventBus::new();
        for _ in 0..5 {
            bus.publish(started("s1"));
        }
        let history = bus.history("s1");
        let seqs: Vec<u64> = history.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let sequenced = bus.publish(started("s1"));
        assert_eq!(sequenced.seq, 0);
        assert_eq!(bus.history("s1").len(), 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_everything() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(started("s1"));

        assert_eq!(rx1.recv().await.unwrap().seq, 0);
        assert_eq!(rx2.recv().await.unwrap().seq, 0);
    }
}
