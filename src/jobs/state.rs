//! # Job lifecycle states.
//!
//! [`JobState`] is a dedicated enum for the supervisor's view of a job. It is
//! deliberately decoupled from anything the worker's internal pipeline may
//! report: the supervisor only cares whether a worker should be attached and
//! whether a stop was requested.
//!
//! ## Transitions
//! ```text
//!            spawn                    request_stop
//! Stopped ──────────► Running ──────────────────────► Stopping
//!    ▲                   │                                │
//!    │   exit(0) /       │ killed unexpectedly            │ worker exits
//!    │   abnormal code   │ → respawn (stays Running)      │
//!    └───────────────────┴────────────────────────────────┘
//! ```

use serde::Serialize;

/// Supervisor-side lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// No worker attached; the job is terminal and evictable once unviewed.
    Stopped,
    /// A worker is attached and expected to be healthy.
    Running,
    /// The supervisor requested termination; the exit is not yet observed.
    Stopping,
}

impl JobState {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobState::Stopped => "stopped",
            JobState::Running => "running",
            JobState::Stopping => "stopping",
        }
    }

    /// True when a worker is expected to be attached.
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running)
    }

    /// True when the job reached its terminal state.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        matches!(self, JobState::Stopped)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}
