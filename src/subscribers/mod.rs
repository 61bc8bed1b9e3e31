//! Event subscribers: trait, fan-out set and the built-in tracing writer.
//!
//! Subscribers observe the runtime event stream without being able to slow
//! it down: the [`SubscriberSet`] gives each subscriber a bounded queue and a
//! dedicated worker task, so a slow consumer drops its own events instead of
//! backpressuring the supervisor.
//!
//! ## Contents
//! - [`Subscribe`] — the subscriber trait
//! - [`SubscriberSet`] — bounded-queue fan-out
//! - [`LogWriter`] — forwards events to `tracing`

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
