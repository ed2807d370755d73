//! Resource governor.
//!
//! Owns every cleanup path of the worker:
//! - [`JobWorkspace`] scopes a job's directory to its pipeline run
//! - the relief pass, run by admission and by the sweeper whenever memory
//!   is over the warn threshold
//! - the periodic TTL sweep of terminal jobs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gait_models::{JobId, JobPaths, JobStatus};
use gait_queue::{JobRegistry, MemoryMonitor};
use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::metrics;

/// Reads the process memory footprint.
pub trait MemoryProbe: Send + Sync {
    fn usage_mb(&self) -> u64;
}

/// Process RSS via `sysinfo`.
pub struct SysinfoMemoryProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoMemoryProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| warn!("Cannot resolve own pid, memory readings disabled: {}", e))
            .ok();
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SysinfoMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoMemoryProbe {
    fn usage_mb(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock();
        system.refresh_process(pid);
        system
            .process(pid)
            .map(|p| p.memory() / 1024 / 1024)
            .unwrap_or(0)
    }
}

pub struct ResourceGovernor {
    registry: Arc<JobRegistry>,
    probe: Arc<dyn MemoryProbe>,
    work_dir: PathBuf,
    job_max_age: chrono::Duration,
    memory_warn_mb: u64,
}

impl ResourceGovernor {
    pub fn new(
        registry: Arc<JobRegistry>,
        probe: Arc<dyn MemoryProbe>,
        work_dir: impl Into<PathBuf>,
        job_max_age: Duration,
        memory_warn_mb: u64,
    ) -> Self {
        Self {
            registry,
            probe,
            work_dir: work_dir.into(),
            job_max_age: chrono::Duration::from_std(job_max_age)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600)),
            memory_warn_mb,
        }
    }

    /// One sweeper round. Over the warn threshold this is a full relief
    /// pass, otherwise only the TTL sweep.
    pub async fn check(&self, now: DateTime<Utc>) {
        let usage = MemoryMonitor::usage_mb(self);
        if usage >= self.memory_warn_mb {
            warn!(
                usage_mb = usage,
                warn_mb = self.memory_warn_mb,
                "Memory above warn threshold, running relief pass"
            );
            self.relieve_at(now).await;
        } else {
            self.sweep_expired(now).await;
        }
    }

    async fn relieve_at(&self, now: DateTime<Utc>) {
        let swept = self.sweep_expired(now).await;
        let orphans = self.remove_orphans().await;
        info!(swept, orphans, "Memory relief pass finished");
    }

    /// Delete terminal jobs older than the retention window, with their files.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let expired = self.registry.expired(now, self.job_max_age);
        let mut swept = 0;
        for job_id in expired {
            if let Some(job) = self.registry.delete(&job_id) {
                remove_dir(&job.paths.job_dir).await;
                swept += 1;
            }
        }
        if swept > 0 {
            info!(swept, "Swept expired jobs");
            metrics::record_swept(swept);
        }
        swept
    }

    /// Delete job directories no live job owns, and leftover frame batches
    /// of jobs that are not running. Returns the number of paths removed.
    pub async fn remove_orphans(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.work_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(work_dir = %self.work_dir.display(), "Cannot scan work dir: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error while scanning work dir: {}", e);
                    break;
                }
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            match self.registry.status(&JobId::from_string(name)) {
                None => {
                    debug!(path = %path.display(), "Removing orphaned job dir");
                    remove_dir(&path).await;
                    removed += 1;
                }
                Some(JobStatus::Running) => {}
                Some(_) => {
                    let frames = path.join("frames");
                    if frames.exists() {
                        remove_dir(&frames).await;
                        removed += 1;
                    }
                }
            }
        }
        removed
    }

    /// Run the TTL sweep every `every` until shutdown is signalled.
    pub async fn run_sweeper(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        info!("Starting job sweeper (interval: {:?})", every);
        let mut ticker = tokio::time::interval(every);
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.check(Utc::now()).await,
            }
        }
        debug!("Job sweeper stopped");
    }
}

#[async_trait]
impl MemoryMonitor for ResourceGovernor {
    fn usage_mb(&self) -> u64 {
        let usage = self.probe.usage_mb();
        metrics::set_process_memory(usage);
        usage
    }

    async fn relieve(&self) {
        self.relieve_at(Utc::now()).await;
    }
}

/// Remove a directory tree, tolerating its absence.
pub async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove directory: {}", e),
    }
}

/// A job's directory for the length of one pipeline run.
///
/// The run ends with [`JobWorkspace::commit`], which keeps the artifacts and
/// drops the frame batches, or [`JobWorkspace::discard`], which removes the
/// whole job directory. A workspace dropped without either (a panic or an
/// aborted task) is discarded off the async threads.
#[derive(Debug)]
pub struct JobWorkspace {
    paths: JobPaths,
    released: bool,
}

impl JobWorkspace {
    pub async fn create(paths: JobPaths) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(&paths.frames_dir).await?;
        Ok(Self {
            paths,
            released: false,
        })
    }

    pub fn job_dir(&self) -> &Path {
        &self.paths.job_dir
    }

    pub fn frames_dir(&self) -> &Path {
        &self.paths.frames_dir
    }

    /// Keep the job directory (the artifacts) and remove the frame batches.
    pub async fn commit(mut self) {
        self.released = true;
        remove_dir(&self.paths.frames_dir).await;
    }

    /// Remove everything the run wrote.
    pub async fn discard(mut self) {
        self.released = true;
        remove_dir(&self.paths.job_dir).await;
        debug!(path = %self.paths.job_dir.display(), "Discarded job workspace");
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let target = self.paths.job_dir.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_dir_blocking(&target));
            }
            Err(_) => remove_dir_blocking(&target),
        }
    }
}

fn remove_dir_blocking(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "Released abandoned job workspace"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to release job workspace: {}", e),
    }
}
