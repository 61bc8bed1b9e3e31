//! # Built-in subscriber that forwards events to `tracing`.
//!
//! [`LogWriter`] turns every bus event into a structured `tracing` record,
//! so an embedding application that installs a `tracing` collector gets the
//! full supervision story for free. Severity mirrors operational impact:
//! health faults and unexpected exits are warnings, drain milestones are
//! info.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that writes events as `tracing` records.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn on_event(&self, ev: &Event) {
        let job = ev.job.as_deref().unwrap_or("-");
        match ev.kind {
            EventKind::JobRegistered => {
                info!(job, "job registered");
            }
            EventKind::JobEvicted => {
                info!(job, "job evicted from registry");
            }
            EventKind::WorkerSpawned => {
                info!(job, pid = ev.pid, age = ev.age, "worker spawned");
            }
            EventKind::WorkerExited => {
                warn!(
                    job,
                    age = ev.age,
                    outcome = ev.reason.as_deref(),
                    "worker exited"
                );
            }
            EventKind::StopRequested => {
                warn!(job, pid = ev.pid, kind = ev.reason.as_deref(), "stop requested");
            }
            EventKind::JobStopped => {
                info!(job, "job stopped");
            }
            EventKind::HeartbeatTimeout => {
                warn!(
                    job,
                    stream = ev.stream.as_deref(),
                    elapsed_ms = ev.elapsed_ms,
                    "heartbeat timeout"
                );
            }
            EventKind::SyncDrift => {
                warn!(job, drift_ms = ev.elapsed_ms, "source streams out of sync");
            }
            EventKind::LogRotated => {
                info!(path = ev.path.as_deref(), pid = ev.pid, "log rotated");
            }
            EventKind::ShutdownRequested => {
                warn!("shutdown requested, draining jobs");
            }
            EventKind::Drained => {
                info!("all jobs drained");
            }
        }
    }
}
