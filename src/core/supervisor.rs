//! # Supervisor: orchestrates the fleet, event fan-out and graceful drain.
//!
//! The [`Supervisor`] owns the event bus, the job registry, the lifecycle
//! manager and a [`SubscriberSet`]. It runs the recurring health monitor,
//! handles OS termination signals and performs the supervisor-wide drain.
//!
//! ## High-level architecture
//! ```text
//! start_job(desc) ──► JobDesc::parse ──► registry.insert ──► lifecycle.spawn
//!                                                                 │
//!   monitor tick ──► sweep + health checks + rotation             ▼
//!        ▲                                              exit watcher task
//!        │                                                        │
//!        └──────────── registry contents ◄── on_exit (respawn / finalize)
//!
//! Event flow:
//!   components ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet
//!
//! Drain path:
//!   OS signal or stop()
//!     └─► draining = true, request_stop(graceful) on every job
//!     └─► monitor keeps sweeping; registry empties → Drained
//!     └─► run() returns Ok, or DrainTimeout after cfg.grace
//! ```
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use streamvisor::{Config, LogWriter, Subscribe, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::default();
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let sup = Supervisor::new(cfg, subs);
//!
//!     sup.start_job(r#"{"name": "cam1", "is_live": true}"#).await?;
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::core::lifecycle::{Lifecycle, StopKind};
use crate::core::monitor::HealthMonitor;
use crate::core::payload::{PayloadChannel, ShmChannel};
use crate::core::registry::{JobRegistry, ViewerRef};
use crate::core::shutdown;
use crate::error::{JobError, SupervisorError};
use crate::events::{Bus, Event, EventKind};
use crate::jobs::{Job, JobDesc};
use crate::status::{FleetStatus, JobStatus};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Coordinates the job fleet: registry, lifecycle, health monitor, drain.
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    registry: Arc<JobRegistry>,
    lifecycle: Arc<Lifecycle>,
    payload: Arc<dyn PayloadChannel>,
    draining: Arc<AtomicBool>,
    drain_begun: CancellationToken,
    drained: CancellationToken,
    runtime_token: CancellationToken,
    start_time: SystemTime,
}

impl Supervisor {
    /// Creates a supervisor with the production payload transport
    /// ([`ShmChannel`] rooted at `cfg.payload_dir`).
    pub fn new(cfg: Config, subscribers: Vec<Arc<dyn Subscribe>>) -> Arc<Self> {
        let payload: Arc<dyn PayloadChannel> = Arc::new(ShmChannel::new(&cfg.payload_dir));
        Self::with_payload(cfg, subscribers, payload)
    }

    /// Creates a supervisor with an injected payload transport.
    pub fn with_payload(
        cfg: Config,
        subscribers: Vec<Arc<dyn Subscribe>>,
        payload: Arc<dyn PayloadChannel>,
    ) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let registry = JobRegistry::new(bus.clone());
        let lifecycle = Lifecycle::new(&cfg, Arc::clone(&payload), bus.clone());
        let subs = Arc::new(SubscriberSet::new(subscribers));

        Arc::new(Self {
            cfg,
            bus,
            subs,
            registry,
            lifecycle,
            payload,
            draining: Arc::new(AtomicBool::new(false)),
            drain_begun: CancellationToken::new(),
            drained: CancellationToken::new(),
            runtime_token: CancellationToken::new(),
            start_time: SystemTime::now(),
        })
    }

    /// The event bus; subscribe here for ad-hoc observation.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The job registry.
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// True once a drain has begun; no new jobs are accepted.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    // ---------------------------
    // Job API
    // ---------------------------

    /// Starts a job from its description document.
    ///
    /// Registers the record (rejecting duplicates), publishes the payload
    /// and spawns the first worker. A spawn failure leaves no job behind.
    /// Returns the job's name.
    pub async fn start_job(&self, desc_text: &str) -> Result<String, JobError> {
        if self.is_draining() {
            return Err(JobError::Draining);
        }

        let desc = JobDesc::parse(desc_text)?;
        let name = desc.name().to_owned();
        let job = Arc::new(Job::new(desc));

        self.registry.insert(Arc::clone(&job)).await?;
        if let Err(e) = self.lifecycle.spawn(&job) {
            self.registry.remove(&name).await;
            let _ = self.payload.remove(&name);
            return Err(e);
        }

        self.bus
            .publish(Event::now(EventKind::JobRegistered).with_job(name.as_str()));
        Ok(name)
    }

    /// Requests a graceful stop of one job.
    pub async fn stop_job(&self, name: &str) -> Result<(), JobError> {
        let job = self
            .registry
            .find(name)
            .await
            .ok_or_else(|| JobError::NotFound {
                name: name.to_owned(),
            })?;
        self.lifecycle.request_stop(&job, StopKind::Graceful)
    }

    /// Looks a job up by streaming access path (`/live/<name>/...`).
    pub async fn find_by_path(&self, path: &str) -> Option<Arc<Job>> {
        self.registry.find_by_path(path).await
    }

    /// Acquires a viewer pin on a job by name.
    pub async fn acquire_viewer(&self, name: &str) -> Result<ViewerRef, JobError> {
        self.registry.acquire_viewer(name).await
    }

    /// Acquires a viewer pin on a job by streaming access path.
    pub async fn acquire_viewer_by_path(&self, path: &str) -> Result<ViewerRef, JobError> {
        self.registry.acquire_viewer_by_path(path).await
    }

    // ---------------------------
    // Status surface
    // ---------------------------

    /// Fleet-wide summary.
    pub async fn status(&self) -> FleetStatus {
        FleetStatus {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            start_time: self.start_time,
            jobs: self.registry.names().await,
        }
    }

    /// Per-job detail, if the job is registered.
    pub async fn job_status(&self, name: &str) -> Option<JobStatus> {
        Some(self.registry.find(name).await?.status())
    }

    // ---------------------------
    // Drain / run
    // ---------------------------

    /// Begins the supervisor-wide drain: refuses new jobs and requests a
    /// graceful stop of every registered one. Idempotent.
    ///
    /// Completion is observed by [`Supervisor::run`], which returns once the
    /// registry empties.
    pub async fn stop(&self) {
        if self.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("drain requested, stopping all jobs");
        self.bus.publish(Event::now(EventKind::ShutdownRequested));

        for job in self.registry.snapshot().await {
            match self.lifecycle.request_stop(&job, StopKind::Graceful) {
                Ok(()) | Err(JobError::AlreadyStopped { .. }) => {}
                Err(e) => error!(job = job.name(), error = %e, "drain stop failed"),
            }
        }
        self.drain_begun.cancel();
    }

    /// Runs the supervisor until a drain completes.
    ///
    /// Spawns the subscriber listener and the health monitor, then waits for
    /// an OS termination signal or a programmatic [`Supervisor::stop`].
    /// After the drain begins, waits up to `cfg.grace` for the registry to
    /// empty (`grace = 0` waits unboundedly).
    pub async fn run(self: &Arc<Self>) -> Result<(), SupervisorError> {
        self.subscriber_listener();
        self.spawn_monitor();

        // Phase 1: wait for a drain to begin.
        tokio::select! {
            _ = shutdown::wait_for_shutdown_signal() => self.stop().await,
            _ = self.drain_begun.cancelled() => {}
        }

        // Phase 2: bounded wait for the registry to empty.
        let result = match self.cfg.drain_grace() {
            None => {
                self.drained.cancelled().await;
                Ok(())
            }
            Some(grace) => {
                match tokio::time::timeout(grace, self.drained.cancelled()).await {
                    Ok(()) => Ok(()),
                    Err(_) => Err(SupervisorError::DrainTimeout {
                        grace,
                        remaining: self.registry.names().await,
                    }),
                }
            }
        };

        self.runtime_token.cancel();
        result
    }

    /// Subscribes to the bus and forwards events to the subscriber set
    /// (fire-and-forget).
    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let subs = Arc::clone(&self.subs);
        let token = self.runtime_token.child_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => subs.emit(&ev),
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
            }
        });
    }

    /// Spawns the recurring health monitor.
    fn spawn_monitor(self: &Arc<Self>) {
        let monitor = HealthMonitor::new(
            self.cfg.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.payload),
            self.bus.clone(),
            Arc::clone(&self.draining),
            self.drained.clone(),
        );
        let token = self.runtime_token.child_token();
        let drained = self.drained.clone();
        tokio::spawn(async move {
            monitor.run(token.clone()).await;
            if !drained.is_cancelled() && !token.is_cancelled() {
                // the fleet is unmonitored from here on: operational fault
                error!("health monitor stopped unexpectedly");
            }
        });
    }
}
