//! # Structured status surface.
//!
//! Shapes returned by [`Supervisor::status`](crate::Supervisor::status) and
//! [`Supervisor::job_status`](crate::Supervisor::job_status). They are plain
//! serde-serializable data: the management layer that exposes them decides
//! the wire format (JSON body, template, whatever); this crate only
//! guarantees the shape.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::jobs::JobState;

/// Fleet-wide summary.
#[derive(Debug, Clone, Serialize)]
pub struct FleetStatus {
    /// Crate version of the running supervisor.
    pub version: String,
    /// When the supervisor started.
    pub start_time: SystemTime,
    /// Names of all registered jobs, sorted.
    pub jobs: Vec<String>,
}

/// One monitored stream endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    /// Stream name.
    pub name: String,
    /// Media timestamp of the most recent buffer.
    pub timestamp: Duration,
    /// Wall-clock time of the last heartbeat.
    pub heartbeat: SystemTime,
}

/// Source-side telemetry of a job.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    /// Consecutive out-of-sync monitor ticks.
    pub sync_error_streak: u32,
    /// Per-stream state.
    pub streams: Vec<StreamStatus>,
}

/// One encoder output of a job.
#[derive(Debug, Clone, Serialize)]
pub struct EncoderStatus {
    /// Encoder name.
    pub name: String,
    /// Aggregate output heartbeat.
    pub heartbeat: SystemTime,
    /// Output segments produced so far.
    pub output_count: u64,
    /// Per-stream state.
    pub streams: Vec<StreamStatus>,
}

/// Per-job detail.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    /// Job name.
    pub name: String,
    /// Lifecycle state.
    pub state: JobState,
    /// Worker incarnation count.
    pub age: u64,
    /// When the current (or last) worker was spawned.
    pub last_start: Option<SystemTime>,
    /// Active viewer references.
    pub viewers: u64,
    /// Smoothed CPU usage of the worker, percent.
    pub cpu_average: f32,
    /// Most recent CPU sample, percent.
    pub cpu_current: f32,
    /// Resident memory of the worker, bytes.
    pub memory: u64,
    /// Source telemetry.
    pub source: SourceStatus,
    /// Encoder telemetry.
    pub encoders: Vec<EncoderStatus>,
}
