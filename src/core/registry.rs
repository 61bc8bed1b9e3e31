//! # Job registry: name-keyed records, viewer pinning, eviction sweep.
//!
//! The registry owns every [`Job`] record and serializes structural mutation
//! (insert/remove) behind one registry-wide lock. Per-job state lives behind
//! the record's own locks, so the health monitor and viewer accounting never
//! contend with the registry scan.
//!
//! ## Architecture
//! ```text
//! start_job ──► insert(job)            monitor tick ──► sweep()
//! streaming ──► find_by_path(uri)                          │
//!               acquire_viewer(name) ──► ViewerRef          ▼
//!                        │                        evict Stopped + unviewed
//!                        ▼
//!              drop(ViewerRef) releases
//! ```
//!
//! ## Rules
//! - Names are unique among live entries; `insert` rejects duplicates.
//! - A [`ViewerRef`] pins its job: the record cannot be evicted while any
//!   guard is alive, and the guard's `Arc` keeps the record readable even
//!   after eviction.
//! - `sweep()` removes every evictable record in one pass under the write
//!   lock; there is no iterator-invalidation hazard because the candidates
//!   are collected before removal.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::JobError;
use crate::events::{Bus, Event, EventKind};
use crate::jobs::Job;

/// Extracts the job name from a streaming access path.
///
/// Paths look like `/live/<name>/encoder/0`: the name is the segment after
/// `/live/`, and at least one more segment must follow.
pub fn job_name_from_path(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/live/")?;
    let (name, tail) = rest.split_once('/')?;
    if name.is_empty() || tail.is_empty() {
        return None;
    }
    Some(name)
}

/// Extracts the encoder index from an access path (`.../encoder/<idx>...`).
pub fn encoder_index_from_path(path: &str) -> Option<usize> {
    let mut segments = path.split('/');
    while let Some(seg) = segments.next() {
        if seg == "encoder" {
            let next = segments.next()?;
            let digits: String = next.chars().take_while(|c| c.is_ascii_digit()).collect();
            return digits.parse().ok();
        }
    }
    None
}

/// Pin held by an external reader of a job's output.
///
/// Dropping the guard releases exactly one viewer reference. The embedded
/// `Arc<Job>` keeps the record alive for the guard's lifetime, so in-flight
/// reads never dereference a freed record even if the job is evicted from
/// the registry meanwhile.
#[derive(Debug)]
pub struct ViewerRef {
    job: Arc<Job>,
}

impl ViewerRef {
    /// The pinned job.
    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }
}

impl Drop for ViewerRef {
    fn drop(&mut self) {
        self.job.remove_viewer();
    }
}

/// Thread-safe collection of job records, keyed by unique name.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
    bus: Bus,
}

impl JobRegistry {
    /// Creates an empty registry.
    pub fn new(bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            bus,
        })
    }

    /// Inserts a record, failing if the name is already registered.
    pub async fn insert(&self, job: Arc<Job>) -> Result<(), JobError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.name()) {
            return Err(JobError::DuplicateName {
                name: job.name().to_owned(),
            });
        }
        jobs.insert(job.name().to_owned(), job);
        Ok(())
    }

    /// Looks a job up by name.
    pub async fn find(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.read().await.get(name).cloned()
    }

    /// Looks a job up by streaming access path (`/live/<name>/...`).
    pub async fn find_by_path(&self, path: &str) -> Option<Arc<Job>> {
        let name = job_name_from_path(path)?;
        self.find(name).await
    }

    /// Acquires a viewer reference on a job by name.
    ///
    /// The increment happens under the registry read lock, so it can never
    /// interleave with a concurrent `sweep()` deciding the same job's fate.
    pub async fn acquire_viewer(&self, name: &str) -> Result<ViewerRef, JobError> {
        let jobs = self.jobs.read().await;
        let job = jobs.get(name).cloned().ok_or_else(|| JobError::NotFound {
            name: name.to_owned(),
        })?;
        job.add_viewer();
        Ok(ViewerRef { job })
    }

    /// Acquires a viewer reference on a job by streaming access path.
    pub async fn acquire_viewer_by_path(&self, path: &str) -> Result<ViewerRef, JobError> {
        let name = job_name_from_path(path).ok_or_else(|| JobError::NotFound {
            name: path.to_owned(),
        })?;
        self.acquire_viewer(name).await
    }

    /// Evicts every record that is Stopped with no viewers.
    ///
    /// Returns the evicted names so the caller can release per-job resources
    /// (payload segments, log directories) outside the lock.
    pub async fn sweep(&self) -> Vec<String> {
        let mut jobs = self.jobs.write().await;
        let evictable: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.evictable())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &evictable {
            jobs.remove(name);
            self.bus
                .publish(Event::now(EventKind::JobEvicted).with_job(name.as_str()));
        }
        evictable
    }

    /// Removes a record unconditionally (failed initial start).
    pub(crate) async fn remove(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.write().await.remove(name)
    }

    /// Sorted names of all registered jobs.
    pub async fn names(&self) -> Vec<String> {
        let jobs = self.jobs.read().await;
        let mut names: Vec<String> = jobs.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Snapshot of all records, for the monitor scan.
    pub async fn snapshot(&self) -> Vec<Arc<Job>> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// Number of registered jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Returns true if no jobs are registered.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
