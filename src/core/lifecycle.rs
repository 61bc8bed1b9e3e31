//! # Worker process lifecycle: spawn, exit classification, stop signaling.
//!
//! The [`Lifecycle`] manager owns everything that touches a worker process:
//! building its argument vector, publishing its description payload,
//! creating the child, watching for its exit and deciding, exactly once per
//! incarnation, whether the job restarts or finalizes.
//!
//! ## Exit flow
//! ```text
//! spawn(job) ──► Command::spawn ──► watcher task: child.wait().await
//!                                          │
//!                                          ▼
//!                              on_exit(job, ExitStatus)
//!                                 ├─ exit(0)                    → Stopped
//!                                 ├─ signaled, state=Stopping   → Stopped   (deliberate)
//!                                 ├─ signaled, state=Running    → respawn   (stays Running)
//!                                 │      └─ respawn fails       → Stopped
//!                                 └─ nonzero code, no signal    → Stopped   (exited, not crashed)
//! ```
//!
//! ## Rules
//! - `age` increments on **every** exit: it counts worker incarnations and
//!   never decreases.
//! - `spawn` leaves `age` unchanged; a crash cycle therefore bumps it by
//!   exactly one.
//! - `request_stop` is fire-and-forget: the signal is sent and the exit is
//!   observed later by the watcher. Only `JobState::Stopping` distinguishes
//!   a supervisor-requested kill from an unsolicited one.
//! - `on_exit` and `spawn` take only the per-job lock; the registry lock is
//!   never held across process creation.

use std::env;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::SystemTime;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::payload::PayloadChannel;
use crate::error::JobError;
use crate::events::{Bus, Event, EventKind};
use crate::jobs::{Job, JobState};
use crate::jobs::record::JobCell;

/// How a stop request terminates the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Polite termination (SIGTERM); used for operator stops and drains.
    Graceful,
    /// Immediate kill (SIGKILL); used by the health monitor on failure.
    Forced,
}

impl StopKind {
    /// Returns a short stable label for logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            StopKind::Graceful => "graceful",
            StopKind::Forced => "forced",
        }
    }

    fn signal(&self) -> Signal {
        match self {
            StopKind::Graceful => Signal::SIGTERM,
            StopKind::Forced => Signal::SIGKILL,
        }
    }
}

/// Classification of a worker exit, combining the OS wait status with
/// whether the supervisor had requested the termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit status 0: the worker finished deliberately.
    NormalCompletion,
    /// Killed by a signal while the job was Stopping: the supervisor asked.
    SignaledWhileStopping {
        /// The terminating signal number.
        signal: i32,
    },
    /// Killed by a signal while the job should have been running: a crash
    /// or an external kill. The only restarting outcome.
    SignaledUnexpectedly {
        /// The terminating signal number.
        signal: i32,
    },
    /// Nonzero exit code without a signal: exited, not crashed.
    AbnormalExitCode {
        /// The exit code.
        code: i32,
    },
}

impl ExitOutcome {
    /// Classifies a wait status against the job's stopping flag.
    pub fn classify(status: ExitStatus, stopping: bool) -> Self {
        if let Some(sig) = status.signal() {
            return if stopping {
                ExitOutcome::SignaledWhileStopping { signal: sig }
            } else {
                ExitOutcome::SignaledUnexpectedly { signal: sig }
            };
        }
        match status.code() {
            Some(0) => ExitOutcome::NormalCompletion,
            Some(code) => ExitOutcome::AbnormalExitCode { code },
            // No code and no signal should not happen on unix; treat as
            // abnormal so the job still finalizes.
            None => ExitOutcome::AbnormalExitCode { code: -1 },
        }
    }

    /// Returns a short stable label for logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExitOutcome::NormalCompletion => "normal_completion",
            ExitOutcome::SignaledWhileStopping { .. } => "signaled_while_stopping",
            ExitOutcome::SignaledUnexpectedly { .. } => "signaled_unexpectedly",
            ExitOutcome::AbnormalExitCode { .. } => "abnormal_exit_code",
        }
    }

    /// True when this outcome triggers a respawn.
    pub fn restarts(&self) -> bool {
        matches!(self, ExitOutcome::SignaledUnexpectedly { .. })
    }
}

/// Spawns and supervises worker processes for jobs.
pub struct Lifecycle {
    log_dir: PathBuf,
    worker_exe: Option<PathBuf>,
    payload: Arc<dyn PayloadChannel>,
    bus: Bus,
}

impl Lifecycle {
    /// Creates a lifecycle manager.
    pub fn new(cfg: &Config, payload: Arc<dyn PayloadChannel>, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            log_dir: cfg.log_dir.clone(),
            worker_exe: cfg.worker_exe.clone(),
            payload,
            bus,
        })
    }

    /// Spawns a worker for the job.
    ///
    /// Publishes the description payload first, then creates the child with
    /// `[exe, --log-dir <dir>, --name <name>, --length <bytes>, --debug?]`
    /// and registers the exit watcher. On success the job is Running with
    /// the new pid attached; `age` is untouched.
    pub fn spawn(self: &Arc<Self>, job: &Arc<Job>) -> Result<(), JobError> {
        let mut cell = job.lock_cell();
        self.spawn_locked(job, &mut cell)
    }

    /// Requests the worker's termination.
    ///
    /// Marks the job Stopping and signals the pid. Fire-and-forget: the
    /// state settles when the watcher observes the exit. Returns
    /// [`JobError::AlreadyStopped`] when no worker is attached.
    pub fn request_stop(&self, job: &Job, kind: StopKind) -> Result<(), JobError> {
        let pid = {
            let mut cell = job.lock_cell();
            let Some(pid) = cell.worker_pid else {
                return Err(JobError::AlreadyStopped {
                    name: job.name().to_owned(),
                });
            };
            cell.state = JobState::Stopping;
            pid
        };

        self.bus.publish(
            Event::now(EventKind::StopRequested)
                .with_job(job.name())
                .with_pid(pid)
                .with_reason(kind.as_label()),
        );
        warn!(job = job.name(), pid, kind = kind.as_label(), "stopping worker");

        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), kind.signal()) {
            // The worker may have exited in the meantime; the watcher will
            // settle the state either way.
            warn!(job = job.name(), pid, error = %e, "stop signal delivery failed");
        }
        Ok(())
    }

    /// Spawn with the job cell already locked; shared by the initial start
    /// and the respawn path inside `on_exit`.
    fn spawn_locked(self: &Arc<Self>, job: &Arc<Job>, cell: &mut JobCell) -> Result<(), JobError> {
        let name = job.name();

        // The payload must be complete before the worker exists.
        self.payload
            .publish(name, job.desc().raw().as_bytes())
            .map_err(|e| JobError::Payload {
                name: name.to_owned(),
                source: e,
            })?;

        let exe = match &self.worker_exe {
            Some(path) => path.clone(),
            None => env::current_exe().map_err(|e| JobError::SpawnFailure {
                name: name.to_owned(),
                source: e,
            })?,
        };

        let mut cmd = Command::new(&exe);
        cmd.arg("--log-dir")
            .arg(&self.log_dir)
            .arg("--name")
            .arg(name)
            .arg("--length")
            .arg(job.desc().byte_len().to_string());
        if let Some(flags) = job.desc().debug() {
            cmd.arg("--debug").arg(flags);
        }

        let child = cmd.spawn().map_err(|e| JobError::SpawnFailure {
            name: name.to_owned(),
            source: e,
        })?;
        let pid = child.id().unwrap_or_default();
        let now = SystemTime::now();

        cell.worker_pid = Some(pid);
        cell.state = JobState::Running;
        cell.last_start = Some(now);
        cell.reset_transient(now);

        self.bus.publish(
            Event::now(EventKind::WorkerSpawned)
                .with_job(name)
                .with_pid(pid)
                .with_age(cell.age),
        );
        info!(job = name, pid, age = cell.age, "worker spawned");

        self.watch(Arc::clone(job), child);
        Ok(())
    }

    /// Registers the asynchronous exit watcher for a freshly spawned child.
    fn watch(self: &Arc<Self>, job: Arc<Job>, mut child: Child) {
        let lifecycle = Arc::clone(self);
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => lifecycle.on_exit(&job, status),
                Err(e) => {
                    error!(job = job.name(), error = %e, "waiting on worker failed");
                    {
                        let mut cell = job.lock_cell();
                        cell.worker_pid = None;
                        cell.age += 1;
                        cell.state = JobState::Stopped;
                    }
                    lifecycle.publish_stopped(job.name());
                }
            }
        });
    }

    /// Handles a worker exit; invoked exactly once per spawned worker.
    pub(crate) fn on_exit(self: &Arc<Self>, job: &Arc<Job>, status: ExitStatus) {
        let mut cell = job.lock_cell();
        let outcome = ExitOutcome::classify(status, cell.state == JobState::Stopping);
        cell.worker_pid = None;
        cell.age += 1;

        self.bus.publish(
            Event::now(EventKind::WorkerExited)
                .with_job(job.name())
                .with_reason(outcome.as_label())
                .with_age(cell.age),
        );

        match outcome {
            ExitOutcome::NormalCompletion => {
                info!(job = job.name(), "worker completed, job stopped");
                cell.state = JobState::Stopped;
                self.publish_stopped(job.name());
            }
            ExitOutcome::SignaledWhileStopping { signal } => {
                info!(job = job.name(), signal, "worker terminated as requested");
                cell.state = JobState::Stopped;
                self.publish_stopped(job.name());
            }
            ExitOutcome::AbnormalExitCode { code } => {
                warn!(job = job.name(), code, "worker exited abnormally, not restarting");
                cell.state = JobState::Stopped;
                self.publish_stopped(job.name());
            }
            ExitOutcome::SignaledUnexpectedly { signal } => {
                warn!(
                    job = job.name(),
                    signal,
                    age = cell.age,
                    "worker died unexpectedly, respawning"
                );
                if let Err(e) = self.spawn_locked(job, &mut cell) {
                    error!(job = job.name(), error = %e, "respawn failed, job stopped");
                    cell.state = JobState::Stopped;
                    self.publish_stopped(job.name());
                }
            }
        }
    }

    fn publish_stopped(&self, name: &str) {
        self.bus
            .publish(Event::now(EventKind::JobStopped).with_job(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload::ShmChannel;
    use crate::jobs::JobDesc;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn fixture(dir: &Path, worker: Option<PathBuf>) -> (Arc<Lifecycle>, Bus) {
        let mut cfg = Config::default().with_log_dir(dir.join("logs"));
        cfg.payload_dir = dir.join("shm");
        cfg.worker_exe = worker;
        let bus = Bus::new(64);
        let payload = Arc::new(ShmChannel::new(&cfg.payload_dir));
        let lifecycle = Lifecycle::new(&cfg, payload, bus.clone());
        (lifecycle, bus)
    }

    fn job(name: &str) -> Arc<Job> {
        let desc = JobDesc::parse(&format!(r#"{{"name": "{name}"}}"#)).expect("valid");
        Arc::new(Job::new(desc))
    }

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("worker.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
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

    #[test]
    fn test_classify_exit_matrix() {
        let exited_zero = ExitStatus::from_raw(0);
        let exited_three = ExitStatus::from_raw(3 << 8);
        let killed = ExitStatus::from_raw(9); // SIGKILL

        assert_eq!(
            ExitOutcome::classify(exited_zero, false),
            ExitOutcome::NormalCompletion
        );
        // a zero exit is a completion even while stopping
        assert_eq!(
            ExitOutcome::classify(exited_zero, true),
            ExitOutcome::NormalCompletion
        );
        assert_eq!(
            ExitOutcome::classify(exited_three, false),
            ExitOutcome::AbnormalExitCode { code: 3 }
        );
        assert_eq!(
            ExitOutcome::classify(killed, true),
            ExitOutcome::SignaledWhileStopping { signal: 9 }
        );
        assert_eq!(
            ExitOutcome::classify(killed, false),
            ExitOutcome::SignaledUnexpectedly { signal: 9 }
        );
        assert!(ExitOutcome::classify(killed, false).restarts());
        assert!(!ExitOutcome::classify(killed, true).restarts());
    }

    #[tokio::test]
    async fn test_normal_exit_finalizes_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = write_script(dir.path(), "exit 0");
        let (lifecycle, bus) = fixture(dir.path(), Some(script));
        let mut rx = bus.subscribe();

        let j = job("cam1");
        lifecycle.spawn(&j).expect("spawn");
        assert!(j.worker_pid().is_some());

        wait_for(&mut rx, EventKind::JobStopped).await;
        assert_eq!(j.state(), JobState::Stopped);
        assert_eq!(j.worker_pid(), None);
        assert_eq!(j.age(), 1);
    }

    #[tokio::test]
    async fn test_abnormal_exit_code_does_not_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = write_script(dir.path(), "exit 7");
        let (lifecycle, bus) = fixture(dir.path(), Some(script));
        let mut rx = bus.subscribe();

        let j = job("cam1");
        lifecycle.spawn(&j).expect("spawn");

        let exited = wait_for(&mut rx, EventKind::WorkerExited).await;
        assert_eq!(exited.reason.as_deref(), Some("abnormal_exit_code"));
        wait_for(&mut rx, EventKind::JobStopped).await;
        assert_eq!(j.state(), JobState::Stopped);
        assert_eq!(j.age(), 1);
    }

    #[tokio::test]
    async fn test_unsolicited_kill_respawns_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = write_script(dir.path(), "exec sleep 30");
        let (lifecycle, bus) = fixture(dir.path(), Some(script));
        let mut rx = bus.subscribe();

        let j = job("cam1");
        lifecycle.spawn(&j).expect("spawn");
        let first_pid = j.worker_pid().expect("attached");
        wait_for(&mut rx, EventKind::WorkerSpawned).await;

        // crash from outside the supervisor
        signal::kill(Pid::from_raw(first_pid as i32), Signal::SIGKILL).expect("kill");

        let respawned = wait_for(&mut rx, EventKind::WorkerSpawned).await;
        assert_eq!(respawned.age, Some(1));
        assert_eq!(j.state(), JobState::Running);
        assert_eq!(j.age(), 1);
        let second_pid = j.worker_pid().expect("respawned");
        assert_ne!(second_pid, first_pid);

        // cleanup
        lifecycle.request_stop(&j, StopKind::Forced).expect("stop");
        wait_for(&mut rx, EventKind::JobStopped).await;
        assert_eq!(j.age(), 2);
    }

    #[tokio::test]
    async fn test_requested_stop_never_respawns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = write_script(dir.path(), "exec sleep 30");
        let (lifecycle, bus) = fixture(dir.path(), Some(script));
        let mut rx = bus.subscribe();

        let j = job("cam1");
        lifecycle.spawn(&j).expect("spawn");
        wait_for(&mut rx, EventKind::WorkerSpawned).await;

        lifecycle
            .request_stop(&j, StopKind::Graceful)
            .expect("stop");
        assert_eq!(j.state(), JobState::Stopping);

        let exited = wait_for(&mut rx, EventKind::WorkerExited).await;
        assert_eq!(exited.reason.as_deref(), Some("signaled_while_stopping"));
        wait_for(&mut rx, EventKind::JobStopped).await;
        assert_eq!(j.state(), JobState::Stopped);
        assert_eq!(j.worker_pid(), None);
        assert_eq!(j.age(), 1);
    }

    #[tokio::test]
    async fn test_request_stop_without_worker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (lifecycle, _bus) = fixture(dir.path(), Some(PathBuf::from("/bin/true")));

        let j = job("cam1");
        let err = lifecycle
            .request_stop(&j, StopKind::Graceful)
            .unwrap_err();
        assert_eq!(err.as_label(), "already_stopped");
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_job_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (lifecycle, _bus) = fixture(dir.path(), Some(PathBuf::from("/nonexistent/worker")));

        let j = job("cam1");
        let err = lifecycle.spawn(&j).unwrap_err();
        assert_eq!(err.as_label(), "spawn_failure");
        assert_eq!(j.state(), JobState::Stopped);
        assert_eq!(j.worker_pid(), None);
        assert_eq!(j.age(), 0);
    }

    #[tokio::test]
    async fn test_payload_is_published_for_worker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = write_script(dir.path(), "exit 0");
        let (lifecycle, bus) = fixture(dir.path(), Some(script));
        let mut rx = bus.subscribe();

        let j = job("cam1");
        lifecycle.spawn(&j).expect("spawn");
        let published = std::fs::read(dir.path().join("shm").join("cam1")).expect("payload");
        assert_eq!(published, j.desc().raw().as_bytes());
        wait_for(&mut rx, EventKind::JobStopped).await;
    }
}
