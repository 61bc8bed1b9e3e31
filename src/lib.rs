//! # streamvisor
//!
//! **Streamvisor** supervises a fleet of long-running media-processing
//! worker processes ("live jobs"), each rendering one streaming pipeline
//! described by a job description document.
//!
//! It provides the supervision core: the job registry, the worker process
//! lifecycle state machine, a periodic health monitor that detects stalled
//! or desynchronized workers and restarts them, size-triggered log rotation
//! tied to process signaling, and a graceful drain protocol.
//!
//! ## Architecture
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   JobDesc    │   │   JobDesc    │   │   JobDesc    │
//!     │ (job #1)     │   │ (job #2)     │   │ (job #3)     │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                       │
//! │  - JobRegistry (records by name, viewer pins, eviction sweep)     │
//! │  - Lifecycle (spawn / exit classification / stop signaling)       │
//! │  - HealthMonitor (2s tick: heartbeats, sync, stats, rotation)     │
//! │  - Bus + SubscriberSet (runtime events, fan-out)                  │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   worker process     worker process     worker process
//!   (OS child, reads   (exit watcher      (signaled SIGTERM/
//!    payload channel)   per child)         SIGKILL/SIGUSR1)
//! ```
//!
//! ## Worker lifecycle
//! ```text
//! start_job(desc)
//!   ├─► JobDesc::parse (name, is_live, debug — the rest stays opaque)
//!   ├─► registry.insert (unique name)
//!   └─► lifecycle.spawn
//!         ├─► payload channel: publish description bytes under the name
//!         ├─► spawn [self, --log-dir, --name, --length, --debug?]
//!         └─► watcher: child.wait() ──► on_exit
//!               ├─ exit(0)                  → Stopped
//!               ├─ signaled while Stopping  → Stopped (deliberate)
//!               ├─ signaled while Running   → respawn, age += 1 per exit
//!               └─ nonzero exit code        → Stopped (exited, not crashed)
//!
//! Eviction: sweep() removes Stopped jobs with no viewer pins; ViewerRef
//! guards keep in-flight reads safe.
//! ```
//!
//! ## Features
//! | Area           | Description                                             | Key types / traits                  |
//! |----------------|---------------------------------------------------------|-------------------------------------|
//! | **Supervision**| Start/stop jobs, drain the fleet.                       | [`Supervisor`], [`Config`]          |
//! | **Registry**   | Lookup by name or access path, viewer pinning.          | [`JobRegistry`], [`ViewerRef`]      |
//! | **Lifecycle**  | Spawn, exit classification, stop signaling.             | [`Lifecycle`], [`ExitOutcome`], [`StopKind`] |
//! | **Telemetry**  | Heartbeats, sync streaks, resource stats.               | [`Job`], [`StreamPulse`]            |
//! | **Status**     | Serde-shaped fleet and per-job detail.                  | [`FleetStatus`], [`JobStatus`]      |
//! | **Events**     | Runtime event stream with subscriber fan-out.           | [`Bus`], [`Event`], [`Subscribe`]   |
//! | **Errors**     | Typed request and runtime errors.                       | [`JobError`], [`SupervisorError`]   |
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use streamvisor::{Config, LogWriter, Subscribe, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = Config::default();
//!     cfg.log_dir = "/var/log/streamvisor".into();
//!
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let sup = Supervisor::new(cfg, subs);
//!
//!     sup.start_job(r#"{"name": "cam1", "is_live": true}"#).await?;
//!
//!     // Runs until an OS termination signal drains the fleet.
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod jobs;
mod status;
mod subscribers;

// ---- Public re-exports ----

pub use config::Config;
pub use core::{
    ExitOutcome, JobRegistry, Lifecycle, PayloadChannel, ShmChannel, StopKind, Supervisor,
    ViewerRef, encoder_index_from_path, job_name_from_path,
};
pub use error::{JobError, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use jobs::{EncoderTelemetry, Job, JobDesc, JobState, SourceTelemetry, StreamPulse};
pub use status::{EncoderStatus, FleetStatus, JobStatus, SourceStatus, StreamStatus};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
