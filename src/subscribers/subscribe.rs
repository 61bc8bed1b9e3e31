//! # Subscriber trait for runtime events.
//!
//! Implement [`Subscribe`] to observe the supervisor's event stream:
//! metrics, alerting, audit trails, dashboards. Subscribers are registered
//! at [`Supervisor`](crate::Supervisor) construction and receive every bus
//! event through their own bounded queue.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use streamvisor::{Event, EventKind, Subscribe};
//!
//! struct RestartCounter;
//!
//! #[async_trait]
//! impl Subscribe for RestartCounter {
//!     fn name(&self) -> &'static str {
//!         "restart-counter"
//!     }
//!
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerSpawned && ev.age.unwrap_or(0) > 0 {
//!             // count a respawn...
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of runtime events.
///
/// ### Delivery contract
/// - Events arrive in order **per subscriber** (FIFO within one queue).
/// - A subscriber that falls behind its [`queue_capacity`](Subscribe::queue_capacity)
///   loses the overflowing events; other subscribers are unaffected.
/// - `on_event` runs on the subscriber's dedicated worker task; it may await
///   freely without blocking the publisher.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Stable subscriber name, used in overflow diagnostics.
    fn name(&self) -> &'static str;

    /// Capacity of this subscriber's event queue.
    fn queue_capacity(&self) -> usize {
        256
    }

    /// Handles a single event.
    async fn on_event(&self, ev: &Event);
}
