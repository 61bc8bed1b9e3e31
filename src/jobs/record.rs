//! # The job record.
//!
//! One [`Job`] per live job, owned by the registry and shared as `Arc<Job>`
//! with the lifecycle manager, the health monitor and viewer guards.
//!
//! ## Locking
//! Two locks, both scoped to the record so high-frequency viewer accounting
//! never contends with the monitor's stat writes:
//! - the **cell lock** guards lifecycle state, the attached worker pid, the
//!   incarnation counter, the resource stat cache and all telemetry;
//! - the **viewer lock** guards only the viewer reference count.
//!
//! Both are `std::sync::Mutex` with short critical sections and are never
//! held across an `.await`. Lock order is cell before viewers; nothing takes
//! them in the other order.
//!
//! ## Invariants
//! - A worker pid is attached iff the state is Running or Stopping.
//! - `age` never decreases; it counts worker incarnations.
//! - The record is evictable only when `state == Stopped` and the viewer
//!   count is zero.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use crate::jobs::desc::JobDesc;
use crate::jobs::state::JobState;
use crate::jobs::telemetry::{EncoderTelemetry, SourceTelemetry};
use crate::status::{EncoderStatus, JobStatus, SourceStatus, StreamStatus};

/// Mutable per-job state, guarded by the cell lock.
#[derive(Debug)]
pub(crate) struct JobCell {
    pub(crate) state: JobState,
    pub(crate) worker_pid: Option<u32>,
    pub(crate) age: u64,
    pub(crate) last_start: Option<SystemTime>,
    pub(crate) cpu_average: f32,
    pub(crate) cpu_current: f32,
    pub(crate) memory: u64,
    pub(crate) source: SourceTelemetry,
    pub(crate) encoders: Vec<EncoderTelemetry>,
}

impl JobCell {
    /// Clears everything a new worker incarnation must not inherit:
    /// heartbeats, timestamps, the sync streak and the stat cache. The
    /// stream layout itself survives.
    pub(crate) fn reset_transient(&mut self, now: SystemTime) {
        self.source.reset(now);
        for enc in &mut self.encoders {
            enc.reset(now);
        }
        self.cpu_average = 0.0;
        self.cpu_current = 0.0;
        self.memory = 0;
    }
}

/// A supervised live job.
#[derive(Debug)]
pub struct Job {
    desc: JobDesc,
    cell: Mutex<JobCell>,
    viewers: Mutex<u64>,
}

impl Job {
    /// Creates a Stopped record for the given description.
    pub fn new(desc: JobDesc) -> Self {
        Self {
            desc,
            cell: Mutex::new(JobCell {
                state: JobState::Stopped,
                worker_pid: None,
                age: 0,
                last_start: None,
                cpu_average: 0.0,
                cpu_current: 0.0,
                memory: 0,
                source: SourceTelemetry::default(),
                encoders: Vec::new(),
            }),
            viewers: Mutex::new(0),
        }
    }

    /// The job's unique name.
    pub fn name(&self) -> &str {
        self.desc.name()
    }

    /// Whether this job renders a live pipeline.
    pub fn is_live(&self) -> bool {
        self.desc.is_live()
    }

    /// The job description.
    pub fn desc(&self) -> &JobDesc {
        &self.desc
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.lock_cell().state
    }

    /// Pid of the attached worker, if any.
    pub fn worker_pid(&self) -> Option<u32> {
        self.lock_cell().worker_pid
    }

    /// Worker incarnation count.
    pub fn age(&self) -> u64 {
        self.lock_cell().age
    }

    /// Active viewer references.
    pub fn viewer_count(&self) -> u64 {
        *self.lock_viewers()
    }

    // ---------------------------
    // Telemetry ingest
    // ---------------------------

    /// Records a source stream heartbeat with its current media timestamp.
    pub fn pulse_source(&self, stream: &str, timestamp: Duration) {
        let now = SystemTime::now();
        self.lock_cell().source.pulse(stream, timestamp, now);
    }

    /// Records a heartbeat for a stream inside an encoder, creating the
    /// encoder entry on first sight.
    pub fn pulse_encoder_stream(&self, encoder: &str, stream: &str, timestamp: Duration) {
        let now = SystemTime::now();
        let mut cell = self.lock_cell();
        let enc = Self::encoder_entry(&mut cell.encoders, encoder, now);
        enc.pulse_stream(stream, timestamp, now);
    }

    /// Records an encoder's aggregate output heartbeat.
    pub fn pulse_encoder_output(&self, encoder: &str) {
        let now = SystemTime::now();
        let mut cell = self.lock_cell();
        let enc = Self::encoder_entry(&mut cell.encoders, encoder, now);
        enc.output_heartbeat = now;
    }

    /// Increments an encoder's output segment counter.
    pub fn bump_encoder_count(&self, encoder: &str) {
        let now = SystemTime::now();
        let mut cell = self.lock_cell();
        let enc = Self::encoder_entry(&mut cell.encoders, encoder, now);
        enc.output_count += 1;
    }

    fn encoder_entry<'a>(
        encoders: &'a mut Vec<EncoderTelemetry>,
        name: &str,
        now: SystemTime,
    ) -> &'a mut EncoderTelemetry {
        if let Some(idx) = encoders.iter().position(|e| e.name == name) {
            &mut encoders[idx]
        } else {
            encoders.push(EncoderTelemetry::new(name, now));
            let last = encoders.len() - 1;
            &mut encoders[last]
        }
    }

    // ---------------------------
    // Status
    // ---------------------------

    /// Captures a consistent snapshot for the status surface.
    pub fn status(&self) -> JobStatus {
        let cell = self.lock_cell();
        let viewers = *self.lock_viewers();

        let stream_status = |streams: &[crate::jobs::StreamPulse]| -> Vec<StreamStatus> {
            streams
                .iter()
                .map(|s| StreamStatus {
                    name: s.name.clone(),
                    timestamp: s.current_timestamp,
                    heartbeat: s.last_heartbeat,
                })
                .collect()
        };

        JobStatus {
            name: self.name().to_owned(),
            state: cell.state,
            age: cell.age,
            last_start: cell.last_start,
            viewers,
            cpu_average: cell.cpu_average,
            cpu_current: cell.cpu_current,
            memory: cell.memory,
            source: SourceStatus {
                sync_error_streak: cell.source.sync_error_streak,
                streams: stream_status(&cell.source.streams),
            },
            encoders: cell
                .encoders
                .iter()
                .map(|e| EncoderStatus {
                    name: e.name.clone(),
                    heartbeat: e.output_heartbeat,
                    output_count: e.output_count,
                    streams: stream_status(&e.streams),
                })
                .collect(),
        }
    }

    // ---------------------------
    // Crate-internal access
    // ---------------------------

    pub(crate) fn lock_cell(&self) -> MutexGuard<'_, JobCell> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_viewers(&self) -> MutexGuard<'_, u64> {
        self.viewers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add_viewer(&self) {
        *self.lock_viewers() += 1;
    }

    pub(crate) fn remove_viewer(&self) {
        let mut viewers = self.lock_viewers();
        *viewers = viewers.saturating_sub(1);
    }

    /// Eviction test: terminal and unobserved.
    pub(crate) fn evictable(&self) -> bool {
        let state = self.lock_cell().state;
        state.is_stopped() && *self.lock_viewers() == 0
    }
}
