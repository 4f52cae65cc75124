//! Concurrent job registry keyed by job id
//!
//! Every update runs under a short scoped lock and touches exactly one
//! record, so jobs running concurrently never interleave partial writes.

use crate::error::{Result, RetouchError};
use crate::job::{ImageJob, JobId, JobStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct RegistryInner {
    jobs: HashMap<JobId, ImageJob>,
    order: Vec<JobId>,
}

/// Shared, cloneable job registry
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryInner>> {
        self.inner
            .lock()
            .map_err(|_| RetouchError::internal("Job registry lock poisoned"))
    }

    /// Insert a job, returning its id
    pub fn insert(&self, job: ImageJob) -> Result<JobId> {
        let id = job.id();
        let mut inner = self.lock()?;
        if inner.jobs.insert(id, job).is_none() {
            inner.order.push(id);
        }
        Ok(id)
    }

    /// Snapshot of a single job
    pub fn get(&self, id: JobId) -> Result<ImageJob> {
        self.lock()?
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| RetouchError::JobNotFound(id.to_string()))
    }

    /// Apply `f` to one job under the registry lock
    pub fn update<T, F>(&self, id: JobId, f: F) -> Result<T>
    where
        F: FnOnce(&mut ImageJob) -> Result<T>,
    {
        let mut inner = self.lock()?;
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| RetouchError::JobNotFound(id.to_string()))?;
        f(job)
    }

    /// Remove a job and hand it back so its buffers can be released
    pub fn remove(&self, id: JobId) -> Result<Option<ImageJob>> {
        let mut inner = self.lock()?;
        let removed = inner.jobs.remove(&id);
        if removed.is_some() {
            inner.order.retain(|existing| *existing != id);
        }
        Ok(removed)
    }

    /// Remove a job only if `check` accepts it, under one lock
    ///
    /// A missing job yields `Ok(None)`; an error from `check` leaves the job
    /// in place.
    pub fn remove_if<F>(&self, id: JobId, check: F) -> Result<Option<ImageJob>>
    where
        F: FnOnce(&ImageJob) -> Result<()>,
    {
        let mut inner = self.lock()?;
        match inner.jobs.get(&id) {
            Some(job) => check(job)?,
            None => return Ok(None),
        }
        let removed = inner.jobs.remove(&id);
        inner.order.retain(|existing| *existing != id);
        Ok(removed)
    }

    /// Drop every job if `check` accepts the current counts, under one lock
    pub fn clear_if<F>(&self, check: F) -> Result<usize>
    where
        F: FnOnce(&JobStatistics) -> Result<()>,
    {
        let mut inner = self.lock()?;
        check(&inner.statistics())?;
        let count = inner.order.len();
        inner.jobs.clear();
        inner.order.clear();
        Ok(count)
    }

    /// Drop every job, returning how many were removed
    pub fn clear(&self) -> Result<usize> {
        let mut inner = self.lock()?;
        let count = inner.order.len();
        inner.jobs.clear();
        inner.order.clear();
        Ok(count)
    }

    /// All jobs in submission order
    pub fn snapshot(&self) -> Result<Vec<ImageJob>> {
        let inner = self.lock()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect())
    }

    /// Ids of jobs currently in `status`, in submission order
    pub fn ids_with_status(&self, status: JobStatus) -> Result<Vec<JobId>> {
        let inner = self.lock()?;
        Ok(inner
            .order
            .iter()
            .filter(|id| inner.jobs.get(*id).is_some_and(|job| job.status() == status))
            .copied()
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.order.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.order.is_empty())
    }

    /// Per-status job counts
    pub fn statistics(&self) -> Result<JobStatistics> {
        Ok(self.lock()?.statistics())
    }
}

impl RegistryInner {
    fn statistics(&self) -> JobStatistics {
        self.jobs
            .values()
            .fold(JobStatistics::default(), |mut stats, job| {
                stats.record(job.status());
                stats
            })
    }
}

/// Job counts grouped by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStatistics {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub awaiting_choice: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStatistics {
    fn record(&mut self, status: JobStatus) {
        self.total += 1;
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Stage1Running | JobStatus::Stage2Running => self.running += 1,
            JobStatus::AwaitingChoice => self.awaiting_choice += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}
