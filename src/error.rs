//! Error types used by the streamvisor runtime and job operations.
//!
//! This module defines two main error enums:
//!
//! - [`JobError`] — errors raised by explicit start/stop/lookup requests.
//! - [`SupervisorError`] — errors raised by the supervisor runtime itself.
//!
//! Failures detected by the health monitor (stale heartbeats, sync drift) are
//! **not** represented here: no caller is synchronously waiting on them, so
//! they drive the forced-restart path internally and surface only as bus
//! events and log records.
//!
//! Both types provide `as_label()` for stable snake_case labels in
//! logs/metrics.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by explicit job requests.
///
/// These are surfaced to the caller of [`Supervisor`](crate::Supervisor)
/// operations. None of them mutate registry state beyond what their
/// documentation says.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum JobError {
    /// A start request named a job that is already registered.
    ///
    /// User error; no state change.
    #[error("job {name} is already registered")]
    DuplicateName {
        /// The conflicting job name.
        name: String,
    },

    /// The OS refused to create the worker process.
    ///
    /// During an initial start the job is not registered; during a respawn
    /// the job is finalized Stopped so the registry can evict it.
    #[error("failed to spawn worker for job {name}: {source}")]
    SpawnFailure {
        /// The job whose worker could not be created.
        name: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A stop request hit a job with no attached worker.
    ///
    /// Idempotent no-op, surfaced so callers can distinguish it.
    #[error("job {name} has no attached worker")]
    AlreadyStopped {
        /// The job name.
        name: String,
    },

    /// Lookup by name or access path found no registered job.
    #[error("job {name} not found")]
    NotFound {
        /// The requested job name.
        name: String,
    },

    /// The supervisor is draining; new jobs are refused.
    #[error("supervisor is draining; new jobs are not accepted")]
    Draining,

    /// The job description is missing a field the core requires.
    #[error("invalid job description: {reason}")]
    InvalidDescription {
        /// What was wrong with the document.
        reason: String,
    },

    /// Writing the description to the out-of-band payload channel failed.
    #[error("payload channel error for job {name}: {source}")]
    Payload {
        /// The job whose payload could not be published.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl JobError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::DuplicateName { .. } => "duplicate_name",
            JobError::SpawnFailure { .. } => "spawn_failure",
            JobError::AlreadyStopped { .. } => "already_stopped",
            JobError::NotFound { .. } => "not_found",
            JobError::Draining => "draining",
            JobError::InvalidDescription { .. } => "invalid_description",
            JobError::Payload { .. } => "payload",
        }
    }

    /// Returns the job name the error refers to, when there is one.
    pub fn job_name(&self) -> Option<&str> {
        match self {
            JobError::DuplicateName { name }
            | JobError::SpawnFailure { name, .. }
            | JobError::AlreadyStopped { name }
            | JobError::NotFound { name }
            | JobError::Payload { name, .. } => Some(name),
            JobError::Draining | JobError::InvalidDescription { .. } => None,
        }
    }
}

/// # Errors produced by the supervisor runtime.
///
/// These represent failures of the supervision process itself, not of an
/// individual job request.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The drain grace period elapsed before the registry emptied.
    ///
    /// The success path is unaffected: when every job stops within the grace
    /// window, [`Supervisor::run`](crate::Supervisor::run) returns `Ok`.
    #[error("drain grace {grace:?} exceeded; remaining jobs: {remaining:?}")]
    DrainTimeout {
        /// The configured grace duration.
        grace: Duration,
        /// Names of jobs still registered when the grace expired.
        remaining: Vec<String>,
    },
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::DrainTimeout { .. } => "drain_timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let err = JobError::DuplicateName { name: "cam1".into() };
        assert_eq!(err.as_label(), "duplicate_name");
        assert_eq!(err.job_name(), Some("cam1"));

        let err = JobError::Draining;
        assert_eq!(err.as_label(), "draining");
        assert_eq!(err.job_name(), None);

        let err = SupervisorError::DrainTimeout {
            grace: Duration::from_secs(5),
            remaining: vec!["cam1".into()],
        };
        assert_eq!(err.as_label(), "drain_timeout");
    }

    #[test]
    fn test_spawn_failure_keeps_source() {
        let err = JobError::SpawnFailure {
            name: "cam1".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("cam1"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
