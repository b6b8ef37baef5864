//! Fan-out of player events to subscribers

use crossbeam_channel::{unbounded, Receiver, Sender};
use mpr_common::PlayerEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Broadcasts [`PlayerEvent`]s to every live subscriber.
///
/// Cloning shares the subscriber list, so the decode worker and caller
/// threads publish to the same audience.
#[derive(Clone, Default)]
pub struct EventHub {
    subscribers: Arc<Mutex<Vec<Sender<PlayerEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to all subscribers, dropping those whose receiver is gone
    pub fn publish(&self, event: PlayerEvent) {
        trace!("Publishing {}", event.event_type());
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpr_common::PlaybackState;

    #[test]
    fn test_publish_reaches_all_and_prunes_dropped() {
        let hub = EventHub::new();
        let first = hub.subscribe();
        let second = hub.subscribe();
        drop(second);

        hub.publish(PlayerEvent::StateChanged {
            old_state: PlaybackState::Stopped,
            new_state: PlaybackState::Playing,
        });

        assert_eq!(hub.subscriber_count(), 1);
        assert!(matches!(first.try_recv(), Ok(PlayerEvent::StateChanged { .. })));
    }
}
