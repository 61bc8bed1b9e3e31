//! Job data model: description, lifecycle state, telemetry and the record.
//!
//! ## Contents
//! - [`JobDesc`] — owned, immutable job description (core reads only the
//!   fields it needs; the rest stays opaque)
//! - [`JobState`] — dedicated lifecycle enum {Stopped, Running, Stopping}
//! - [`StreamPulse`], [`SourceTelemetry`], [`EncoderTelemetry`] — per-stream
//!   heartbeat/timestamp state
//! - [`Job`] — the registry record: per-job locked state, viewer count,
//!   resource stat cache

mod desc;
pub(crate) mod record;
mod state;
mod telemetry;

pub use desc::JobDesc;
pub use record::Job;
pub use state::JobState;
pub use telemetry::{EncoderTelemetry, SourceTelemetry, StreamPulse};
