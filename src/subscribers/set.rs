//! # Non-blocking event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`] — distributes events to multiple subscribers
//! concurrently without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!     │    (bounded)
//!     ├──► [queue 2] ──► worker 2 ──► subscriber2.on_event()
//!     │    (bounded)
//!     └──► [queue N] ──► worker N ──► subscriberN.on_event()
//!          (bounded)
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N while
//!   B processes N+5.
//! - **Overflow**: the event is dropped for that subscriber only and a
//!   warning is logged.
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`).
//! - **Per-subscriber FIFO**: each subscriber sees its events in order.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

use crate::events::Event;
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event subscribers.
///
/// Manages per-subscriber queues and worker tasks, providing:
/// - **Concurrent delivery**: events reach all subscribers simultaneously
/// - **Isolation**: each subscriber has a dedicated queue and worker
/// - **Overflow handling**: dropped events are logged, never block
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// Workers run until their queue closes, which happens when the set is
    /// dropped.
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut channels = Vec::with_capacity(subscribers.len());
        let mut workers = Vec::with_capacity(subscribers.len());

        for sub in subscribers {
            let capacity = sub.queue_capacity().max(1);
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(capacity);
            channels.push(SubscriberChannel {
                name: sub.name(),
                sender: tx,
            });
            workers.push(tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    sub.on_event(&ev).await;
                }
            }));
        }

        Self { channels, workers }
    }

    /// Fans an event out to every subscriber queue without blocking.
    ///
    /// Full or closed queues drop the event for that subscriber only.
    pub fn emit(&self, ev: &Event) {
        if self.channels.is_empty() {
            return;
        }
        let shared = Arc::new(ev.clone());
        for ch in &self.channels {
            if let Err(e) = ch.sender.try_send(Arc::clone(&shared)) {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "full",
                    mpsc::error::TrySendError::Closed(_) => "closed",
                };
                warn!(subscriber = ch.name, reason, "subscriber queue overflow, event dropped");
            }
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if no subscribers are registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Drop for SubscriberSet {
    fn drop(&mut self) {
        // Closing the senders lets workers drain and exit on their own.
        self.channels.clear();
        for w in &self.workers {
            w.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counter {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl Subscribe for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn on_event(&self, _ev: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber() {
        let a = Arc::new(Counter { seen: AtomicUsize::new(0) });
        let b = Arc::new(Counter { seen: AtomicUsize::new(0) });
        let subs: Vec<Arc<dyn Subscribe>> = vec![a.clone(), b.clone()];
        let set = SubscriberSet::new(subs);
        assert_eq!(set.len(), 2);

        for _ in 0..5 {
            set.emit(&Event::now(EventKind::WorkerSpawned));
        }

        // Delivery is asynchronous; give the workers a moment.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(a.seen.load(Ordering::SeqCst), 5);
        assert_eq!(b.seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_empty_set_emit_is_noop() {
        let set = SubscriberSet::new(Vec::new());
        assert!(set.is_empty());
        set.emit(&Event::now(EventKind::Drained));
    }
}
