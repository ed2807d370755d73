//! In-memory job registry.
//!
//! Readers get cloned snapshots. Each job has a single writer (its admission
//! path, then its worker), so writes only take the lock for the duration of
//! one state change and never across an await.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use gait_models::{Job, JobArtifacts, JobError, JobId, JobStatistics, JobStatus, Stage};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{QueueError, QueueResult};

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new job. An existing record with the same id is replaced.
    pub fn create(&self, job: Job) {
        debug!(job_id = %job.id, "Registering job");
        self.jobs.write().insert(job.id.clone(), job);
    }

    /// Snapshot of a job.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().get(id).cloned()
    }

    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.jobs.read().get(id).map(|job| job.status)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Snapshots of every job.
    pub fn list(&self) -> Vec<Job> {
        self.jobs.read().values().cloned().collect()
    }

    /// Number of jobs currently in `status`.
    pub fn count_with_status(&self, status: JobStatus) -> usize {
        self.jobs.read().values().filter(|j| j.status == status).count()
    }

    fn with_job<T>(&self, id: &JobId, f: impl FnOnce(&mut Job) -> QueueResult<T>) -> QueueResult<T> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))?;
        f(job)
    }

    /// Record progress. Returns false when the job is not running.
    pub fn update_progress(&self, id: &JobId, progress: u8, stage: Stage) -> QueueResult<bool> {
        self.with_job(id, |job| Ok(job.set_progress(progress, stage)))
    }

    pub fn mark_running(&self, id: &JobId) -> QueueResult<()> {
        self.with_job(id, |job| Ok(job.start()?))
    }

    pub fn mark_completed(
        &self,
        id: &JobId,
        artifacts: JobArtifacts,
        statistics: JobStatistics,
    ) -> QueueResult<()> {
        self.with_job(id, |job| Ok(job.complete(artifacts, statistics)?))
    }

    pub fn mark_failed(&self, id: &JobId, error: JobError) -> QueueResult<()> {
        self.with_job(id, |job| Ok(job.fail(error)?))
    }

    /// Move a PENDING or RUNNING job to CANCELLED.
    pub fn mark_cancelled(&self, id: &JobId) -> QueueResult<()> {
        self.with_job(id, |job| {
            if job.is_terminal() {
                return Err(QueueError::NotCancellable {
                    job_id: job.id.clone(),
                    status: job.status,
                });
            }
            Ok(job.cancel()?)
        })
    }

    /// Remove a job record, returning its last snapshot.
    pub fn delete(&self, id: &JobId) -> Option<Job> {
        let removed = self.jobs.write().remove(id);
        if removed.is_some() {
            debug!(job_id = %id, "Deleted job record");
        }
        removed
    }

    /// Terminal jobs whose time since finishing exceeds `max_age`.
    pub fn expired(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<JobId> {
        self.jobs
            .read()
            .values()
            .filter(|job| job.is_terminal())
            .filter(|job| job.terminal_age(now).is_some_and(|age| age > max_age))
            .map(|job| job.id.clone())
            .collect()
    }
}
