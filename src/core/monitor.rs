//! # Recurring health monitor.
//!
//! One cooperative task drives the whole maintenance cycle on a fixed
//! interval: registry sweep, drain-completion detection, per-job health
//! checks and log rotation, sequentially, never overlapping itself.
//!
//! ## Tick flow
//! ```text
//! every cfg.tick:
//!   ├─► registry.sweep()           evict Stopped + unviewed, drop payloads
//!   ├─► draining?
//!   │     ├─ yes: registry empty? → publish Drained, signal run(), exit
//!   │     └─ no:
//!   │         ├─► for each live Running job:
//!   │         │     1. source stream heartbeats        (heartbeat_timeout)
//!   │         │     2. encoder stream heartbeats       (heartbeat_timeout)
//!   │         │     3. encoder output heartbeats       (encoder_output_timeout)
//!   │         │     4. sync spread streak              (sync_threshold × sync_strikes)
//!   │         │     5. cpu/memory stat refresh         (sysinfo)
//!   │         │   a fault at any step forces a stop and skips the rest
//!   │         │   of this job's checks for the tick
//!   │         └─► log rotation (supervisor log + running jobs' logs)
//!   └─► sleep until next tick
//! ```
//!
//! ## Rules
//! - Checks run only against Running jobs of live pipelines; Stopped and
//!   Stopping jobs are skipped, as is everything once draining begins.
//! - Health faults never surface as API errors: the forced stop and the
//!   bus event are the whole response.
//! - The job's cell lock is held for the evaluation only; the stop request
//!   and the stat sampling relock briefly, so exit watchers are never
//!   blocked behind a scan.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::core::lifecycle::{Lifecycle, StopKind};
use crate::core::payload::PayloadChannel;
use crate::core::registry::JobRegistry;
use crate::core::rotate;
use crate::error::JobError;
use crate::events::{Bus, Event, EventKind};
use crate::jobs::record::JobCell;
use crate::jobs::{Job, JobState};

/// Weight of the newest CPU sample in the smoothed average.
const CPU_SMOOTHING: f32 = 0.2;

/// Internal failure classification; drives the forced-stop path and is
/// never surfaced as an API error.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HealthFault {
    /// A monitored endpoint's heartbeat went stale.
    Heartbeat { endpoint: String, elapsed: Duration },
    /// Source streams stayed out of sync for the full strike count.
    Sync { drift: Duration },
}

/// Recurring health/rotation task.
pub(crate) struct HealthMonitor {
    cfg: Config,
    registry: Arc<JobRegistry>,
    lifecycle: Arc<Lifecycle>,
    payload: Arc<dyn PayloadChannel>,
    bus: Bus,
    draining: Arc<AtomicBool>,
    drained: CancellationToken,
    system: System,
}

impl HealthMonitor {
    pub(crate) fn new(
        cfg: Config,
        registry: Arc<JobRegistry>,
        lifecycle: Arc<Lifecycle>,
        payload: Arc<dyn PayloadChannel>,
        bus: Bus,
        draining: Arc<AtomicBool>,
        drained: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            registry,
            lifecycle,
            payload,
            bus,
            draining,
            drained,
            system: System::new(),
        }
    }

    /// Runs the tick loop until drain completion or runtime shutdown.
    pub(crate) async fn run(mut self, token: CancellationToken) {
        let start = time::Instant::now() + self.cfg.first_tick_delay;
        let mut ticker = time::interval_at(start, self.cfg.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if self.tick().await {
                return;
            }
        }
    }

    /// One maintenance cycle. Returns true when the drain completed and the
    /// loop should exit.
    async fn tick(&mut self) -> bool {
        let evicted = self.registry.sweep().await;
        for name in &evicted {
            if let Err(e) = self.payload.remove(name) {
                warn!(job = name.as_str(), error = %e, "payload cleanup failed");
            }
        }

        if self.draining.load(Ordering::SeqCst) {
            if self.registry.is_empty().await {
                self.bus.publish(Event::now(EventKind::Drained));
                self.drained.cancel();
                return true;
            }
            let remaining = self.registry.len().await;
            debug!(remaining, "draining, waiting for jobs");
            return false;
        }

        let jobs = self.registry.snapshot().await;
        for job in &jobs {
            self.check_job(job);
        }
        self.rotate_logs(&jobs);
        false
    }

    /// All five health checks for one job; a fault short-circuits the rest.
    fn check_job(&mut self, job: &Arc<Job>) {
        if !job.is_live() {
            return;
        }

        let now = SystemTime::now();
        let (fault, pid) = {
            let mut cell = job.lock_cell();
            if cell.state != JobState::Running {
                return;
            }
            (Self::evaluate(&mut cell, now, &self.cfg), cell.worker_pid)
        };

        if let Some(fault) = fault {
            self.fail_job(job, fault);
            return;
        }

        if let Some(pid) = pid {
            if let Some((cpu, memory)) = self.sample_stats(pid) {
                let mut cell = job.lock_cell();
                cell.cpu_current = cpu;
                cell.cpu_average = if cell.cpu_average == 0.0 {
                    cpu
                } else {
                    cell.cpu_average + (cpu - cell.cpu_average) * CPU_SMOOTHING
                };
                cell.memory = memory;
            }
        }
    }

    /// Judges heartbeats and sync drift; updates the streak counter.
    ///
    /// Must be called with the job Running. Returns the first fault found,
    /// in check order.
    fn evaluate(cell: &mut JobCell, now: SystemTime, cfg: &Config) -> Option<HealthFault> {
        let elapsed = |hb: SystemTime| now.duration_since(hb).unwrap_or_default();

        // 1. source stream heartbeats
        for s in cell.source.streams.iter().filter(|s| s.is_av()) {
            let age = elapsed(s.last_heartbeat);
            if age > cfg.heartbeat_timeout {
                return Some(HealthFault::Heartbeat {
                    endpoint: format!("source.{}", s.name),
                    elapsed: age,
                });
            }
        }

        // 2. encoder stream heartbeats
        for enc in &cell.encoders {
            for s in enc.streams.iter().filter(|s| s.is_av()) {
                let age = elapsed(s.last_heartbeat);
                if age > cfg.heartbeat_timeout {
                    return Some(HealthFault::Heartbeat {
                        endpoint: format!("{}.{}", enc.name, s.name),
                        elapsed: age,
                    });
                }
            }
        }

        // 3. encoder output heartbeats
        for enc in &cell.encoders {
            let age = elapsed(enc.output_heartbeat);
            if age > cfg.encoder_output_timeout {
                return Some(HealthFault::Heartbeat {
                    endpoint: format!("{}.output", enc.name),
                    elapsed: age,
                });
            }
        }

        // 4. sync drift streak
        if let Some(drift) = cell.source.sync_spread() {
            if drift > cfg.sync_threshold {
                cell.source.sync_error_streak += 1;
                if cell.source.sync_error_streak >= cfg.sync_strikes {
                    return Some(HealthFault::Sync { drift });
                }
            } else {
                cell.source.sync_error_streak = 0;
            }
        }

        None
    }

    /// Publishes the fault and forces a restart-path stop.
    fn fail_job(&self, job: &Arc<Job>, fault: HealthFault) {
        match &fault {
            HealthFault::Heartbeat { endpoint, elapsed } => {
                error!(
                    job = job.name(),
                    endpoint = endpoint.as_str(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "heartbeat timeout, stopping worker"
                );
                self.bus.publish(
                    Event::now(EventKind::HeartbeatTimeout)
                        .with_job(job.name())
                        .with_stream(endpoint.as_str())
                        .with_elapsed(*elapsed),
                );
            }
            HealthFault::Sync { drift } => {
                error!(
                    job = job.name(),
                    drift_ms = drift.as_millis() as u64,
                    "source streams out of sync, stopping worker"
                );
                self.bus.publish(
                    Event::now(EventKind::SyncDrift)
                        .with_job(job.name())
                        .with_elapsed(*drift),
                );
            }
        }

        match self.lifecycle.request_stop(job, StopKind::Forced) {
            Ok(()) => {}
            // the worker can beat the monitor to the exit; nothing to do
            Err(JobError::AlreadyStopped { .. }) => {}
            Err(e) => warn!(job = job.name(), error = %e, "forced stop failed"),
        }
    }

    /// Samples the worker's CPU and resident memory.
    fn sample_stats(&mut self, pid: u32) -> Option<(f32, u64)> {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        self.system
            .process(pid)
            .map(|p| (p.cpu_usage(), p.memory()))
    }

    /// Rotates the supervisor's own log and every attached worker's log.
    fn rotate_logs(&self, jobs: &[Arc<Job>]) {
        rotate::rotate_log(
            &self.cfg.supervisor_log_path(),
            std::process::id(),
            self.cfg.log_max_size,
            self.cfg.log_retention,
            &self.bus,
        );
        for job in jobs {
            if let Some(pid) = job.worker_pid() {
                rotate::rotate_log(
                    &self.cfg.job_log_path(job.name()),
                    pid,
                    self.cfg.log_max_size,
                    self.cfg.log_retention,
                    &self.bus,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload::ShmChannel;
    use crate::jobs::JobDesc;
    use std::path::{Path, PathBuf};
    use tokio::sync::broadcast;

    fn cfg() -> Config {
        let mut cfg = Config::default();
        cfg.heartbeat_timeout = Duration::from_secs(10);
        cfg.encoder_output_timeout = Duration::from_secs(60);
        cfg.sync_threshold = Duration::from_secs(3);
        cfg.sync_strikes = 3;
        cfg
    }

    fn running_job(name: &str) -> Arc<Job> {
        let desc = JobDesc::parse(&format!(r#"{{"name": "{name}"}}"#)).expect("valid");
        let job = Arc::new(Job::new(desc));
        {
            let mut cell = job.lock_cell();
            cell.state = JobState::Running;
            cell.worker_pid = Some(1);
        }
        job
    }

    fn endpoint_of(fault: HealthFault) -> String {
        match fault {
            HealthFault::Heartbeat { endpoint, .. } => endpoint,
            HealthFault::Sync { .. } => panic!("expected heartbeat fault"),
        }
    }

    #[test]
    fn test_fresh_heartbeats_are_healthy() {
        let job = running_job("cam1");
        let now = SystemTime::now();
        job.pulse_source("video_0", Duration::from_secs(1));
        job.pulse_source("audio_0", Duration::from_secs(1));
        job.pulse_encoder_stream("encoder_0", "video_0", Duration::from_secs(1));
        job.pulse_encoder_output("encoder_0");

        let mut cell = job.lock_cell();
        assert_eq!(HealthMonitor::evaluate(&mut cell, now, &cfg()), None);
        assert_eq!(cell.source.sync_error_streak, 0);
    }

    #[test]
    fn test_stale_source_stream_faults() {
        let job = running_job("cam1");
        job.pulse_source("video_0", Duration::from_secs(1));

        let later = SystemTime::now() + Duration::from_secs(30);
        let mut cell = job.lock_cell();
        let fault = HealthMonitor::evaluate(&mut cell, later, &cfg()).expect("fault");
        assert_eq!(endpoint_of(fault), "source.video_0");
    }

    #[test]
    fn test_non_av_streams_are_ignored() {
        let job = running_job("cam1");
        job.pulse_source("subtitle_0", Duration::ZERO);

        let later = SystemTime::now() + Duration::from_secs(300);
        let mut cell = job.lock_cell();
        assert_eq!(HealthMonitor::evaluate(&mut cell, later, &cfg()), None);
    }

    #[test]
    fn test_stale_encoder_stream_faults() {
        let job = running_job("cam1");
        let now = SystemTime::now();
        job.pulse_encoder_stream("encoder_0", "audio_0", Duration::from_secs(1));
        {
            // keep the aggregate output fresh so only the stream is stale
            let mut cell = job.lock_cell();
            cell.encoders[0].output_heartbeat = now + Duration::from_secs(30);
        }

        let later = now + Duration::from_secs(30);
        let mut cell = job.lock_cell();
        let fault = HealthMonitor::evaluate(&mut cell, later, &cfg()).expect("fault");
        assert_eq!(endpoint_of(fault), "encoder_0.audio_0");
    }

    #[test]
    fn test_encoder_output_has_larger_threshold() {
        let job = running_job("cam1");
        job.pulse_encoder_output("encoder_0");

        // past the stream threshold but not the output threshold
        let later = SystemTime::now() + Duration::from_secs(30);
        let mut cell = job.lock_cell();
        assert_eq!(HealthMonitor::evaluate(&mut cell, later, &cfg()), None);
        drop(cell);

        let much_later = SystemTime::now() + Duration::from_secs(90);
        let mut cell = job.lock_cell();
        let fault = HealthMonitor::evaluate(&mut cell, much_later, &cfg()).expect("fault");
        assert_eq!(endpoint_of(fault), "encoder_0.output");
    }

    #[test]
    fn test_sync_streak_faults_on_third_strike() {
        let job = running_job("cam1");
        let now = SystemTime::now();
        job.pulse_source("video_0", Duration::from_secs(10));
        job.pulse_source("audio_0", Duration::from_secs(1));

        let config = cfg();
        let mut cell = job.lock_cell();
        assert_eq!(HealthMonitor::evaluate(&mut cell, now, &config), None);
        assert_eq!(cell.source.sync_error_streak, 1);
        assert_eq!(HealthMonitor::evaluate(&mut cell, now, &config), None);
        assert_eq!(cell.source.sync_error_streak, 2);
        let fault = HealthMonitor::evaluate(&mut cell, now, &config).expect("third strike");
        assert_eq!(fault, HealthFault::Sync { drift: Duration::from_secs(9) });
    }

    #[test]
    fn test_healthy_tick_resets_streak() {
        let job = running_job("cam1");
        let now = SystemTime::now();
        job.pulse_source("video_0", Duration::from_secs(10));
        job.pulse_source("audio_0", Duration::from_secs(1));

        let config = cfg();
        let mut cell = job.lock_cell();
        HealthMonitor::evaluate(&mut cell, now, &config);
        HealthMonitor::evaluate(&mut cell, now, &config);
        assert_eq!(cell.source.sync_error_streak, 2);
        drop(cell);

        // streams converge again
        job.pulse_source("audio_0", Duration::from_secs(10));
        let mut cell = job.lock_cell();
        assert_eq!(HealthMonitor::evaluate(&mut cell, now, &config), None);
        assert_eq!(cell.source.sync_error_streak, 0);
    }

    // --- integration: a stale heartbeat forces a stop on a real worker ---

    fn write_script(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("worker.sh");
        std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").expect("write script");
        let mut perm = std::fs::metadata(&path).expect("meta").permissions();
        perm.set_mode(0o755);
        std::fs::set_permissions(&path, perm).expect("chmod");
        path
    }

    async fn wait_for(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let ev = rx.recv().await.expect("bus open");
                if ev.kind == kind {
                    return ev;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_heartbeat_timeout_forces_stop_without_respawn() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = cfg().with_log_dir(dir.path().join("logs"));
        config.payload_dir = dir.path().join("shm");
        config.worker_exe = Some(write_script(dir.path()));

        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let payload: Arc<dyn PayloadChannel> = Arc::new(ShmChannel::new(&config.payload_dir));
        let registry = JobRegistry::new(bus.clone());
        let lifecycle = Lifecycle::new(&config, Arc::clone(&payload), bus.clone());

        let desc = JobDesc::parse(r#"{"name": "cam1"}"#).expect("valid");
        let job = Arc::new(Job::new(desc));
        registry.insert(Arc::clone(&job)).await.expect("insert");
        lifecycle.spawn(&job).expect("spawn");

        job.pulse_source("video_0", Duration::from_secs(1));
        {
            let mut cell = job.lock_cell();
            cell.source.streams[0].last_heartbeat = SystemTime::now() - Duration::from_secs(60);
        }

        let mut monitor = HealthMonitor::new(
            config,
            Arc::clone(&registry),
            Arc::clone(&lifecycle),
            payload,
            bus.clone(),
            Arc::new(AtomicBool::new(false)),
            CancellationToken::new(),
        );
        monitor.check_job(&job);

        let stop = wait_for(&mut rx, EventKind::StopRequested).await;
        assert_eq!(stop.reason.as_deref(), Some("forced"));
        wait_for(&mut rx, EventKind::JobStopped).await;
        // a monitor-forced stop is deliberate: no respawn
        assert_eq!(job.state(), JobState::Stopped);
        assert_eq!(job.worker_pid(), None);
        assert_eq!(job.age(), 1);
    }
}
