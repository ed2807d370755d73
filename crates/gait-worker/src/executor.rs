//! Job executor.
//!
//! Admitted jobs wait in the pending queue; the dispatch loop hands them to
//! at most `max_concurrent_jobs` workers in FIFO order. Each running job owns
//! a cancellation token that the pipeline checks at stage and batch
//! boundaries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use gait_media::VideoIo;
use gait_models::{Job, JobId, JobStatus};
use gait_pose::{DetectorFactory, PoseConfig};
use gait_queue::{AdmissionController, JobRegistry, PendingQueue, QueueError, QueueResult};
use parking_lot::Mutex;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::governor::{remove_dir, MemoryProbe, ResourceGovernor};
use crate::logging::JobLogger;
use crate::metrics;
use crate::processor::{process_job, ProcessingContext};

/// Job executor: admission, dispatch, cancellation and shutdown.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<ProcessingContext>,
    registry: Arc<JobRegistry>,
    queue: Arc<PendingQueue>,
    admission: AdmissionController,
    governor: Arc<ResourceGovernor>,
    job_semaphore: Arc<Semaphore>,
    /// Tokens of RUNNING jobs. Lock order: tokens, then registry.
    tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        pose_config: PoseConfig,
        video: Arc<dyn VideoIo>,
        detectors: Arc<dyn DetectorFactory>,
        probe: Arc<dyn MemoryProbe>,
    ) -> WorkerResult<Self> {
        config.validate()?;
        pose_config.validate()?;

        let registry = Arc::new(JobRegistry::new());
        let queue = Arc::new(PendingQueue::new(config.max_pending_jobs));
        let governor = Arc::new(ResourceGovernor::new(
            Arc::clone(&registry),
            probe,
            &config.work_dir,
            config.job_max_age,
            config.memory_warn_mb,
        ));
        let admission = AdmissionController::new(
            config.admission(),
            Arc::clone(&registry),
            Arc::clone(&queue),
            governor.clone(),
        );
        let ctx = Arc::new(ProcessingContext {
            config: config.clone(),
            pose_config,
            registry: Arc::clone(&registry),
            video,
            detectors,
        });
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            job_semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config,
            ctx,
            registry,
            queue,
            admission,
            governor,
            tokens: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        })
    }

    /// Admit a video. Rejections are immediate; nothing is buffered beyond
    /// the pending queue.
    pub async fn submit(&self, input: impl Into<PathBuf>) -> QueueResult<JobId> {
        let result = self.admission.submit(input).await;
        match &result {
            Ok(_) => metrics::record_admitted(),
            Err(e) => {
                if let Some(reason) = e.reject_reason() {
                    metrics::record_rejected(reason);
                }
            }
        }
        metrics::set_pending_jobs(self.queue.len());
        result
    }

    /// Snapshot of a job.
    pub fn status(&self, job_id: &JobId) -> Option<Job> {
        self.registry.get(job_id)
    }

    /// Cancel a job.
    ///
    /// A PENDING job is dequeued and CANCELLED immediately. A RUNNING job is
    /// signalled and becomes CANCELLED once its worker has cleaned up.
    pub fn cancel(&self, job_id: &JobId) -> QueueResult<()> {
        let tokens = self.tokens.lock();
        if let Some(token) = tokens.get(job_id) {
            info!(job_id = %job_id, "Cancelling running job");
            token.cancel();
            return Ok(());
        }

        self.queue.remove(job_id);
        self.registry.mark_cancelled(job_id)?;
        drop(tokens);

        info!(job_id = %job_id, "Cancelled pending job");
        metrics::record_cancelled();
        metrics::set_pending_jobs(self.queue.len());
        Ok(())
    }

    /// Remove a job and its files, cancelling it first if it is live.
    pub async fn delete(&self, job_id: &JobId) -> QueueResult<()> {
        let job = {
            let tokens = self.tokens.lock();
            if let Some(token) = tokens.get(job_id) {
                token.cancel();
            }
            self.queue.remove(job_id);
            self.registry
                .delete(job_id)
                .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?
        };
        remove_dir(&job.paths.job_dir).await;
        info!(job_id = %job_id, status = %job.status, "Deleted job");
        metrics::set_pending_jobs(self.queue.len());
        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn running_count(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn governor(&self) -> &Arc<ResourceGovernor> {
        &self.governor
    }

    /// Dispatch jobs until shutdown, then wait for in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor with {} max concurrent jobs, {} pending slots",
            self.config.max_concurrent_jobs, self.config.max_pending_jobs
        );
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let sweeper = tokio::spawn(
            Arc::clone(&self.governor).run_sweeper(self.config.sweep_interval, self.shutdown.subscribe()),
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // Hold a slot before taking a job so FIFO order is dispatch order
            let permit = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                permit = Arc::clone(&self.job_semaphore).acquire_owned() => {
                    permit.map_err(|_| WorkerError::internal("job semaphore closed"))?
                }
            };

            let job_id = loop {
                if let Some(job_id) = self.queue.pop() {
                    break Some(job_id);
                }
                if *shutdown_rx.borrow() {
                    break None;
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = self.queue.notified() => {}
                }
            };
            let Some(job_id) = job_id else {
                break;
            };
            metrics::set_pending_jobs(self.queue.len());
            self.dispatch(job_id, permit);
        }

        info!("Shutdown signal received, waiting for in-flight jobs...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("Shutdown timeout reached, cancelling remaining jobs");
            for token in self.tokens.lock().values() {
                token.cancel();
            }
            self.wait_for_jobs().await;
        }
        if let Err(e) = sweeper.await {
            error!("Job sweeper task failed: {}", e);
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Start a popped job on its own task. Jobs cancelled while queued are
    /// skipped.
    fn dispatch(&self, job_id: JobId, permit: OwnedSemaphorePermit) {
        let token = CancellationToken::new();
        {
            let mut tokens = self.tokens.lock();
            if let Err(e) = self.registry.mark_running(&job_id) {
                debug!(job_id = %job_id, "Skipping job: {}", e);
                return;
            }
            tokens.insert(job_id.clone(), token.clone());
        }

        let ctx = Arc::clone(&self.ctx);
        let tokens = Arc::clone(&self.tokens);
        tokio::spawn(async move {
            let _permit = permit;
            let worker = tokio::spawn({
                let ctx = Arc::clone(&ctx);
                let job_id = job_id.clone();
                async move { process_job(&ctx, &job_id, &token).await }
            });
            let result = match worker.await {
                Ok(result) => result,
                Err(e) => Err(WorkerError::internal(format!("worker task panicked: {}", e))),
            };
            Self::finish_job(&ctx.registry, &tokens, &job_id, result);
        });
    }

    /// Record the terminal state, then release the job's token.
    fn finish_job(
        registry: &JobRegistry,
        tokens: &Mutex<HashMap<JobId, CancellationToken>>,
        job_id: &JobId,
        result: WorkerResult<crate::processor::JobOutcome>,
    ) {
        let logger = JobLogger::new(job_id);
        let mut tokens = tokens.lock();
        let marked = match result {
            Ok(outcome) => {
                logger.log_completion(&outcome.statistics);
                metrics::record_completed();
                registry.mark_completed(job_id, outcome.artifacts, outcome.statistics)
            }
            Err(e) if e.is_cancelled() => {
                logger.log_cancelled();
                metrics::record_cancelled();
                registry.mark_cancelled(job_id)
            }
            Err(e) => {
                let job_error = e.to_job_error();
                logger.log_error(&job_error.to_string());
                metrics::record_failed(job_error.stage);
                registry.mark_failed(job_id, job_error)
            }
        };
        tokens.remove(job_id);
        drop(tokens);

        match marked {
            Ok(()) => {}
            Err(QueueError::JobNotFound(_)) => debug!(job_id = %job_id, "Job deleted while running"),
            Err(e) => error!(job_id = %job_id, "Failed to record job outcome: {}", e),
        }
    }

    /// Wait for all in-flight jobs to complete.
    pub async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Wait until no job is PENDING or RUNNING.
    pub async fn wait_until_idle(&self) {
        loop {
            let live = self.registry.count_with_status(JobStatus::Pending)
                + self.registry.count_with_status(JobStatus::Running);
            if live == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.queue.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDetectorFactory, FakeVideoIo};
    use gait_models::{Stage, LANDMARK_COUNT};
    use gait_queue::RejectReason;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    struct SettableProbe(AtomicU64);

    impl MemoryProbe for SettableProbe {
        fn usage_mb(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct Harness {
        dir: TempDir,
        executor: Arc<JobExecutor>,
        detectors: Arc<FakeDetectorFactory>,
        probe: Arc<SettableProbe>,
    }

    fn harness(video: FakeVideoIo, max_jobs: usize, max_pending: usize) -> Harness {
        let dir = TempDir::new().unwrap();
        let config = WorkerConfig {
            max_concurrent_jobs: max_jobs,
            max_pending_jobs: max_pending,
            work_dir: dir.path().join("work"),
            batch_size: 5,
            memory_warn_mb: 1000,
            memory_reject_mb: 2000,
            ..Default::default()
        };
        let detectors = Arc::new(FakeDetectorFactory::default());
        let probe = Arc::new(SettableProbe(AtomicU64::new(100)));
        let executor = JobExecutor::new(
            config,
            PoseConfig::default(),
            Arc::new(video),
            detectors.clone(),
            probe.clone(),
        )
        .unwrap();
        Harness {
            dir,
            executor: Arc::new(executor),
            detectors,
            probe,
        }
    }

    fn input(h: &Harness) -> PathBuf {
        let path = h.dir.path().join("walk.mp4");
        std::fs::write(&path, b"video").unwrap();
        path
    }

    fn start(h: &Harness) -> tokio::task::JoinHandle<WorkerResult<()>> {
        let executor = Arc::clone(&h.executor);
        tokio::spawn(async move { executor.run().await })
    }

    async fn wait_for_status(h: &Harness, id: &JobId, status: JobStatus) -> Job {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Some(job) = h.executor.status(id) {
                    if job.status == status {
                        return job;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_clean_clip_completes() {
        let h = harness(FakeVideoIo::new(10), 2, 10);
        let runner = start(&h);

        let id = h.executor.submit(input(&h)).await.unwrap();
        let job = wait_for_status(&h, &id, JobStatus::Completed).await;

        assert_eq!(job.progress, 100);
        let stats = job.statistics.unwrap();
        assert_eq!(stats.frames_processed, 10);
        assert_eq!(stats.interpolated_landmarks, 0);
        assert!((stats.avg_confidence - 0.9).abs() < 1e-6);
        let artifacts = job.artifacts.unwrap();
        let table = std::fs::read_to_string(artifacts.pose_data.unwrap()).unwrap();
        assert_eq!(table.lines().count(), 1 + 10 * LANDMARK_COUNT);
        assert!(!job.paths.frames_dir.exists());

        // One detector per job, released when the job ends
        assert_eq!(h.detectors.created.load(Ordering::SeqCst), 1);
        assert_eq!(h.detectors.released.load(Ordering::SeqCst), 1);

        h.executor.shutdown();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let h = harness(
            FakeVideoIo::new(60).with_extract_delay(Duration::from_millis(5)),
            1,
            10,
        );
        let runner = start(&h);
        let id = h.executor.submit(input(&h)).await.unwrap();

        let mut seen = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let job = h.executor.status(&id).unwrap();
                seen.push(job.progress);
                if job.is_terminal() {
                    assert_eq!(job.status, JobStatus::Completed);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
        assert_eq!(seen.last(), Some(&100));

        h.executor.shutdown();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_running_job_mid_batch() {
        let h = harness(
            FakeVideoIo::new(300).with_extract_delay(Duration::from_millis(20)),
            1,
            10,
        );
        let runner = start(&h);
        let id = h.executor.submit(input(&h)).await.unwrap();

        let job = wait_for_status(&h, &id, JobStatus::Running).await;
        tokio::time::timeout(Duration::from_secs(10), async {
            while h.executor.status(&id).unwrap().current_stage < Stage::PoseExtraction {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        h.executor.cancel(&id).unwrap();
        let cancelled = wait_for_status(&h, &id, JobStatus::Cancelled).await;
        assert!(cancelled.progress < 75);
        assert!(cancelled.artifacts.is_none());
        assert!(!job.paths.job_dir.exists());
        assert_eq!(h.detectors.released.load(Ordering::SeqCst), 1);
        assert_eq!(h.executor.running_count(), 0);

        h.executor.shutdown();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_stage_is_reported() {
        let h = harness(FakeVideoIo::new(8).failing_encode(), 1, 10);
        let runner = start(&h);
        let id = h.executor.submit(input(&h)).await.unwrap();

        let job = wait_for_status(&h, &id, JobStatus::Failed).await;
        let error = job.error.unwrap();
        assert_eq!(error.stage, Some(Stage::Overlay));
        assert!(error.message.contains("encoder crashed"));
        assert!(!job.paths.job_dir.exists());

        // Terminal snapshots do not change
        assert_eq!(h.executor.status(&id).unwrap().updated_at, job.updated_at);

        h.executor.shutdown();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancel_pending_job_without_workers() {
        let h = harness(FakeVideoIo::new(5), 1, 10);
        let first = h.executor.submit(input(&h)).await.unwrap();
        let second = h.executor.submit(input(&h)).await.unwrap();

        h.executor.cancel(&first).unwrap();
        assert_eq!(h.executor.status(&first).unwrap().status, JobStatus::Cancelled);
        assert_eq!(h.executor.pending_len(), 1);
        assert!(matches!(
            h.executor.cancel(&first),
            Err(QueueError::NotCancellable { .. })
        ));

        let runner = start(&h);
        wait_for_status(&h, &second, JobStatus::Completed).await;
        assert_eq!(h.detectors.created.load(Ordering::SeqCst), 1);
        h.executor.shutdown();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_queue_full_rejection() {
        let h = harness(FakeVideoIo::new(5), 1, 3);
        for _ in 0..3 {
            h.executor.submit(input(&h)).await.unwrap();
        }
        let err = h.executor.submit(input(&h)).await.unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::QueueFull));
        assert_eq!(h.executor.pending_len(), 3);
    }

    #[tokio::test]
    async fn test_memory_pressure_rejection() {
        let h = harness(FakeVideoIo::new(5), 1, 10);
        h.probe.0.store(2500, Ordering::SeqCst);
        let err = h.executor.submit(input(&h)).await.unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::MemoryPressure));

        h.probe.0.store(500, Ordering::SeqCst);
        h.executor.submit(input(&h)).await.unwrap();
    }

    #[tokio::test]
    async fn test_fifo_dispatch_with_single_slot() {
        let h = harness(FakeVideoIo::new(5), 1, 10);
        let ids: Vec<_> = {
            let mut ids = Vec::new();
            for _ in 0..3 {
                ids.push(h.executor.submit(input(&h)).await.unwrap());
            }
            ids
        };
        let runner = start(&h);
        h.executor.wait_until_idle().await;

        let finished: Vec<_> = ids
            .iter()
            .map(|id| h.executor.status(id).unwrap().finished_at.unwrap())
            .collect();
        assert!(finished.windows(2).all(|w| w[0] <= w[1]));

        h.executor.shutdown();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_delete_completed_job() {
        let h = harness(FakeVideoIo::new(5), 1, 10);
        let runner = start(&h);
        let id = h.executor.submit(input(&h)).await.unwrap();
        let job = wait_for_status(&h, &id, JobStatus::Completed).await;
        assert!(job.paths.job_dir.exists());

        h.executor.delete(&id).await.unwrap();
        assert!(h.executor.status(&id).is_none());
        assert!(!job.paths.job_dir.exists());
        assert!(matches!(
            h.executor.delete(&id).await,
            Err(QueueError::JobNotFound(_))
        ));

        h.executor.shutdown();
        runner.await.unwrap().unwrap();
    }
}
