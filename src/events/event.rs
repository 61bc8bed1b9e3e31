//! # Runtime events emitted by the supervisor and its components.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Registry events**: a job enters or leaves the fleet
//! - **Worker events**: process spawn, exit and stop requests
//! - **Health events**: heartbeat timeouts, sync drift, log rotation
//! - **Shutdown events**: drain lifecycle
//!
//! The [`Event`] struct carries optional metadata such as the job name,
//! worker pid, incarnation count and human-readable reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! delivered out of order.
//!
//! ## Example
//! ```rust
//! use streamvisor::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::WorkerExited)
//!     .with_job("cam1")
//!     .with_reason("signaled_unexpectedly")
//!     .with_age(3);
//!
//! assert_eq!(ev.kind, EventKind::WorkerExited);
//! assert_eq!(ev.job.as_deref(), Some("cam1"));
//! assert_eq!(ev.age, Some(3));
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Registry events ===
    /// A job was registered and its first worker spawned.
    ///
    /// Sets: `job`.
    JobRegistered,

    /// A stopped, unviewed job was evicted by the registry sweep.
    ///
    /// Sets: `job`.
    JobEvicted,

    // === Worker events ===
    /// A worker process was created for a job (first start or respawn).
    ///
    /// Sets: `job`, `pid`, `age` (incarnation count at spawn time).
    WorkerSpawned,

    /// A worker process exited; `reason` carries the exit classification.
    ///
    /// Sets: `job`, `reason`, `age` (incarnation count after the exit).
    WorkerExited,

    /// A stop was requested for a job; `reason` is `graceful` or `forced`.
    ///
    /// Sets: `job`, `reason`, `pid`.
    StopRequested,

    /// A job reached its terminal Stopped state and will not restart.
    ///
    /// Sets: `job`.
    JobStopped,

    // === Health events ===
    /// A monitored stream's heartbeat exceeded its threshold.
    ///
    /// Sets: `job`, `stream`, `elapsed_ms`.
    HeartbeatTimeout,

    /// Source streams drifted apart beyond the sync threshold for the
    /// configured number of consecutive ticks.
    ///
    /// Sets: `job`, `elapsed_ms` (drift).
    SyncDrift,

    /// A log file crossed the size threshold and was rotated.
    ///
    /// Sets: `path`, `pid` (owner that was signaled to reopen).
    LogRotated,

    // === Shutdown events ===
    /// Supervisor-wide drain requested; all jobs are being stopped.
    ShutdownRequested,

    /// The registry emptied while draining; the supervisor is done.
    Drained,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the job, if applicable.
    pub job: Option<Arc<str>>,
    /// Name of the stream or encoder endpoint, if applicable.
    pub stream: Option<Arc<str>>,
    /// Human-readable reason (exit classification, stop kind, errors).
    pub reason: Option<Arc<str>>,
    /// Worker pid, if applicable.
    pub pid: Option<u32>,
    /// Job incarnation counter, if applicable.
    pub age: Option<u64>,
    /// Elapsed heartbeat age or sync drift in milliseconds (compact).
    pub elapsed_ms: Option<u64>,
    /// Filesystem path, for rotation events.
    pub path: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            job: None,
            stream: None,
            reason: None,
            pid: None,
            age: None,
            elapsed_ms: None,
            path: None,
        }
    }

    /// Attaches a job name.
    #[inline]
    pub fn with_job(mut self, job: impl Into<Arc<str>>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Attaches a stream/encoder endpoint name.
    #[inline]
    pub fn with_stream(mut self, stream: impl Into<Arc<str>>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a worker pid.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an incarnation count.
    #[inline]
    pub fn with_age(mut self, age: u64) -> Self {
        self.age = Some(age);
        self
    }

    /// Attaches an elapsed duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.elapsed_ms = Some(ms);
        self
    }

    /// Attaches a filesystem path.
    #[inline]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(Arc::from(path.display().to_string().as_str()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_strictly_increases() {
        let a = Event::now(EventKind::WorkerSpawned);
        let b = Event::now(EventKind::WorkerExited);
        let c = Event::now(EventKind::JobStopped);
        assert!(a.seq < b.seq);
        assert!(b.seq < c.seq);
    }

    #[test]
    fn test_builders_attach_metadata() {
        let ev = Event::now(EventKind::HeartbeatTimeout)
            .with_job("cam1")
            .with_stream("video_0")
            .with_elapsed(Duration::from_millis(12_500));
        assert_eq!(ev.job.as_deref(), Some("cam1"));
        assert_eq!(ev.stream.as_deref(), Some("video_0"));
        assert_eq!(ev.elapsed_ms, Some(12_500));
        assert!(ev.pid.is_none());
    }
}
