//! Admission control.
//!
//! A submission is checked against queue capacity first, then against
//! process memory. Memory above the warn threshold triggers a relief pass
//! before the reject threshold is applied.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use gait_models::{Job, JobId, JobPaths};
use tracing::{info, warn};

use crate::error::{QueueError, QueueResult, RejectReason};
use crate::queue::PendingQueue;
use crate::registry::JobRegistry;

/// Source of process memory readings and the relief action run under pressure.
#[async_trait]
pub trait MemoryMonitor: Send + Sync {
    /// Current process memory in MiB.
    fn usage_mb(&self) -> u64;

    /// Release what can be released (expired jobs, orphaned files).
    async fn relieve(&self);
}

#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Root under which each job gets its own directory
    pub work_dir: PathBuf,
    pub memory_warn_mb: u64,
    pub memory_reject_mb: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/gait"),
            memory_warn_mb: 2048,
            memory_reject_mb: 3072,
        }
    }
}

pub struct AdmissionController {
    config: AdmissionConfig,
    registry: Arc<JobRegistry>,
    queue: Arc<PendingQueue>,
    monitor: Arc<dyn MemoryMonitor>,
}

impl AdmissionController {
    pub fn new(
        config: AdmissionConfig,
        registry: Arc<JobRegistry>,
        queue: Arc<PendingQueue>,
        monitor: Arc<dyn MemoryMonitor>,
    ) -> Self {
        Self {
            config,
            registry,
            queue,
            monitor,
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Admit a video for analysis, returning the new job's id.
    pub async fn submit(&self, input: impl Into<PathBuf>) -> QueueResult<JobId> {
        if self.queue.is_full() {
            warn!(capacity = self.queue.capacity(), "Rejecting submission: queue full");
            return Err(QueueError::rejected(RejectReason::QueueFull));
        }

        self.check_memory().await?;

        let job_id = JobId::new();
        let paths = JobPaths::under(&self.config.work_dir, &job_id, input);
        self.registry.create(Job::new(job_id.clone(), paths));

        // Another submitter may have filled the queue since the first check
        if let Err(e) = self.queue.try_push(job_id.clone()) {
            self.registry.delete(&job_id);
            warn!(job_id = %job_id, "Rejecting submission: queue full");
            return Err(e);
        }

        info!(job_id = %job_id, pending = self.queue.len(), "Job admitted");
        Ok(job_id)
    }

    async fn check_memory(&self) -> QueueResult<()> {
        let usage = self.monitor.usage_mb();
        if usage < self.config.memory_warn_mb {
            return Ok(());
        }

        warn!(
            usage_mb = usage,
            warn_mb = self.config.memory_warn_mb,
            "Memory above warn threshold, running relief"
        );
        self.monitor.relieve().await;

        let usage = self.monitor.usage_mb();
        if usage >= self.config.memory_reject_mb {
            warn!(
                usage_mb = usage,
                reject_mb = self.config.memory_reject_mb,
                "Rejecting submission: memory pressure"
            );
            return Err(QueueError::rejected(RejectReason::MemoryPressure));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gait_models::JobStatus;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// Reports a settable usage; relief optionally lowers it.
    #[derive(Default)]
    struct FakeMonitor {
        usage: AtomicU64,
        after_relief: Option<u64>,
        reliefs: AtomicUsize,
    }

    #[async_trait]
    impl MemoryMonitor for FakeMonitor {
        fn usage_mb(&self) -> u64 {
            self.usage.load(Ordering::SeqCst)
        }

        async fn relieve(&self) {
            self.reliefs.fetch_add(1, Ordering::SeqCst);
            if let Some(lower) = self.after_relief {
                self.usage.store(lower, Ordering::SeqCst);
            }
        }
    }

    fn controller(capacity: usize, monitor: Arc<FakeMonitor>) -> (AdmissionController, Arc<JobRegistry>, Arc<PendingQueue>) {
        let registry = Arc::new(JobRegistry::new());
        let queue = Arc::new(PendingQueue::new(capacity));
        let config = AdmissionConfig {
            work_dir: PathBuf::from("/tmp/gait-admission"),
            memory_warn_mb: 100,
            memory_reject_mb: 200,
        };
        let controller = AdmissionController::new(config, Arc::clone(&registry), Arc::clone(&queue), monitor);
        (controller, registry, queue)
    }

    #[tokio::test]
    async fn test_admits_pending_job() {
        let (controller, registry, queue) = controller(2, Arc::new(FakeMonitor::default()));
        let id = controller.submit("/videos/walk.mp4").await.unwrap();

        let job = registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.paths.input, PathBuf::from("/videos/walk.mp4"));
        assert!(job.paths.job_dir.ends_with(id.as_str()));
        assert_eq!(queue.pop(), Some(id));
    }

    #[tokio::test]
    async fn test_queue_full_on_overflow() {
        let (controller, registry, queue) = controller(10, Arc::new(FakeMonitor::default()));
        for _ in 0..10 {
            controller.submit("/videos/a.mp4").await.unwrap();
        }
        let err = controller.submit("/videos/a.mp4").await.unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::QueueFull));
        assert_eq!(queue.len(), 10);
        assert_eq!(registry.len(), 10);
    }

    #[tokio::test]
    async fn test_memory_pressure_until_usage_drops() {
        let monitor = Arc::new(FakeMonitor::default());
        monitor.usage.store(250, Ordering::SeqCst);
        let (controller, registry, _) = controller(10, Arc::clone(&monitor));

        for _ in 0..3 {
            let err = controller.submit("/videos/a.mp4").await.unwrap_err();
            assert_eq!(err.reject_reason(), Some(RejectReason::MemoryPressure));
        }
        assert_eq!(monitor.reliefs.load(Ordering::SeqCst), 3);
        assert!(registry.is_empty());

        monitor.usage.store(50, Ordering::SeqCst);
        controller.submit("/videos/a.mp4").await.unwrap();
        assert_eq!(monitor.reliefs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_relief_can_avoid_rejection() {
        let monitor = Arc::new(FakeMonitor {
            after_relief: Some(150),
            ..Default::default()
        });
        monitor.usage.store(250, Ordering::SeqCst);
        let (controller, _, _) = controller(10, Arc::clone(&monitor));

        // Between warn and reject after relief: admitted
        controller.submit("/videos/a.mp4").await.unwrap();
        assert_eq!(monitor.reliefs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queue_checked_before_memory() {
        let monitor = Arc::new(FakeMonitor::default());
        let (controller, _, _) = controller(1, Arc::clone(&monitor));
        controller.submit("/videos/a.mp4").await.unwrap();

        monitor.usage.store(500, Ordering::SeqCst);
        let err = controller.submit("/videos/a.mp4").await.unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::QueueFull));
        assert_eq!(monitor.reliefs.load(Ordering::SeqCst), 0);
    }
}
