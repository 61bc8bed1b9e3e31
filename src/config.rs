//! # Global runtime configuration.
//!
//! Provides [`Config`], centralized settings for the supervisor runtime:
//! the monitor cadence, the health thresholds, log rotation limits, the
//! drain grace window and the worker spawn parameters.
//!
//! ## Sentinel values
//! - `grace = 0s` → unbounded drain wait (the supervisor waits for the
//!   registry to empty no matter how long it takes).
//! - `worker_exe = None` → workers are spawned from the supervisor's own
//!   executable (`std::env::current_exe()`).

use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name used for the supervisor's log and for each job's log inside its
/// own directory.
pub const LOG_FILE_NAME: &str = "streamvisor.log";

/// Global configuration for the supervisor runtime.
///
/// Defines:
/// - **Monitor cadence**: tick interval and initial delay
/// - **Health thresholds**: stream/encoder heartbeats, sync drift, strike count
/// - **Log rotation**: size trigger and retention
/// - **Shutdown behavior**: drain grace window
/// - **Worker spawning**: log directory, payload directory, executable override
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory that holds the supervisor log and one subdirectory per job.
    pub log_dir: PathBuf,

    /// Interval between health/rotation ticks.
    pub tick: Duration,

    /// Delay before the first tick after the supervisor starts, so freshly
    /// spawned workers get a head start before their heartbeats are judged.
    pub first_tick_delay: Duration,

    /// Maximum heartbeat age for source and encoder streams before the job
    /// is considered stalled.
    pub heartbeat_timeout: Duration,

    /// Maximum age of an encoder's aggregate output heartbeat. Larger than
    /// [`Config::heartbeat_timeout`]: segment production is burstier than
    /// per-frame stream activity.
    pub encoder_output_timeout: Duration,

    /// Maximum allowed spread between the current timestamps of a job's
    /// audio/video source streams.
    pub sync_threshold: Duration,

    /// Number of consecutive ticks the sync spread must exceed
    /// [`Config::sync_threshold`] before the job is forcibly restarted.
    pub sync_strikes: u32,

    /// Log file size above which rotation is triggered.
    pub log_max_size: u64,

    /// Number of rotated log files kept per base path; older rotations are
    /// deleted.
    pub log_retention: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages
    /// will skip older items. Minimum value is 1 (enforced by the bus).
    pub bus_capacity: usize,

    /// Maximum time to wait for the registry to empty during a drain.
    ///
    /// `Duration::ZERO` waits unboundedly. On expiry
    /// [`Supervisor::run`](crate::Supervisor::run) returns
    /// [`SupervisorError::DrainTimeout`](crate::SupervisorError::DrainTimeout).
    pub grace: Duration,

    /// Directory backing the out-of-band payload channel that hands the job
    /// description to the worker.
    pub payload_dir: PathBuf,

    /// Worker executable override. `None` spawns the supervisor's own
    /// executable, which is expected to detect the `--name` argument and run
    /// as a worker.
    pub worker_exe: Option<PathBuf>,
}

impl Config {
    /// Returns the drain grace as an `Option`.
    ///
    /// - `None` → wait unboundedly
    /// - `Some(d)` → give up after `d` and report the remaining jobs
    #[inline]
    pub fn drain_grace(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Path of the supervisor's own log file.
    pub fn supervisor_log_path(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }

    /// Path of a job's log file (`<log_dir>/<name>/streamvisor.log`).
    pub fn job_log_path(&self, name: &str) -> PathBuf {
        self.log_dir.join(name).join(LOG_FILE_NAME)
    }

    /// Returns a copy with a different log directory.
    pub fn with_log_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.log_dir = dir.as_ref().to_path_buf();
        self
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `tick = 2s`, `first_tick_delay = 5s`
    /// - `heartbeat_timeout = 10s`, `encoder_output_timeout = 60s`
    /// - `sync_threshold = 3s`, `sync_strikes = 3`
    /// - `log_max_size = 4 MiB`, `log_retention = 100`
    /// - `bus_capacity = 1024`
    /// - `grace = 60s`
    /// - `log_dir = /var/log/streamvisor`, `payload_dir = /dev/shm`
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/log/streamvisor"),
            tick: Duration::from_secs(2),
            first_tick_delay: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(10),
            encoder_output_timeout: Duration::from_secs(60),
            sync_threshold: Duration::from_secs(3),
            sync_strikes: 3,
            log_max_size: 4 * 1024 * 1024,
            log_retention: 100,
            bus_capacity: 1024,
            grace: Duration::from_secs(60),
            payload_dir: PathBuf::from("/dev/shm"),
            worker_exe: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_grace_means_unbounded() {
        let mut cfg = Config::default();
        assert_eq!(cfg.drain_grace(), Some(Duration::from_secs(60)));
        cfg.grace = Duration::ZERO;
        assert_eq!(cfg.drain_grace(), None);
    }

    #[test]
    fn test_log_paths() {
        let cfg = Config::default().with_log_dir("/tmp/logs");
        assert_eq!(
            cfg.supervisor_log_path(),
            PathBuf::from("/tmp/logs/streamvisor.log")
        );
        assert_eq!(
            cfg.job_log_path("cam1"),
            PathBuf::from("/tmp/logs/cam1/streamvisor.log")
        );
    }

    #[test]
    fn test_bus_capacity_clamped() {
        let mut cfg = Config::default();
        cfg.bus_capacity = 0;
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
