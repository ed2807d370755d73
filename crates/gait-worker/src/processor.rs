//! Per-job pipeline.
//!
//! Trim -> ResizeIfNeeded -> ExtractFrames/PoseExtraction (batched) ->
//! Interpolation -> Overlay -> ThumbnailAndPreview -> Finalize.
//!
//! Frames are decoded in fixed-size batches and dropped as soon as the pose
//! session has consumed them, so peak memory does not grow with the video.
//! The overlay stage decodes the video a second time, batch by batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use gait_media::{frame_file_name, FrameBatch, MediaError, VideoIo};
use gait_models::{FrameRecord, JobArtifacts, JobId, JobPaths, JobStatistics, Stage};
use gait_pose::{draw_skeleton, render_pose_table, DetectorFactory, DetectorLease, PoseConfig, PoseSession};
use gait_queue::{JobRegistry, QueueError};
use image::RgbImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::governor::JobWorkspace;
use crate::logging::JobLogger;
use crate::metrics;

const TRIMMED_FILE: &str = "trimmed.mp4";
const ANALYSIS_FILE: &str = "analysis.mp4";
const OVERLAY_FILE: &str = "overlay.mp4";
const POSE_DATA_FILE: &str = "pose_data.csv";
const THUMBNAIL_FILE: &str = "thumbnail.jpg";
const PREVIEW_FILE: &str = "preview.mp4";

// Progress reported on entering each stage. Pose extraction spreads over
// POSE_START..POSE_END as batches finish; overlay over OVERLAY_START..OVERLAY_END.
const TRIM_PROGRESS: u8 = 5;
const RESIZE_PROGRESS: u8 = 10;
const POSE_START: u8 = 15;
const POSE_END: u8 = 75;
const INTERPOLATION_PROGRESS: u8 = 78;
const OVERLAY_START: u8 = 80;
const OVERLAY_END: u8 = 92;
const THUMBNAIL_PROGRESS: u8 = 95;
const FINALIZE_PROGRESS: u8 = 98;

/// Shared collaborators for every job.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub pose_config: PoseConfig,
    pub registry: Arc<JobRegistry>,
    pub video: Arc<dyn VideoIo>,
    pub detectors: Arc<dyn DetectorFactory>,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub artifacts: JobArtifacts,
    pub statistics: JobStatistics,
}

/// Run the pipeline for a RUNNING job.
///
/// Errors come back as [`WorkerError::StageFailed`] naming the stage that
/// was running, or as a cancellation. The job directory is gone on every
/// error path by the time this returns.
pub async fn process_job(
    ctx: &ProcessingContext,
    job_id: &JobId,
    cancel: &CancellationToken,
) -> WorkerResult<JobOutcome> {
    let logger = JobLogger::new(job_id);
    let span = logger.create_span();
    let mut run = JobRun {
        ctx,
        job_id,
        cancel,
        logger,
        stage: Stage::Queued,
        stage_started: Instant::now(),
    };

    let result = run.execute().instrument(span).await;
    run.finish_stage();

    result.map_err(|e| {
        if e.is_cancelled() {
            WorkerError::Cancelled
        } else {
            WorkerError::stage_failed(run.stage, e.to_string())
        }
    })
}

struct JobRun<'a> {
    ctx: &'a ProcessingContext,
    job_id: &'a JobId,
    cancel: &'a CancellationToken,
    logger: JobLogger,
    stage: Stage,
    stage_started: Instant,
}

impl JobRun<'_> {
    async fn execute(&mut self) -> WorkerResult<JobOutcome> {
        let paths = self
            .ctx
            .registry
            .get(self.job_id)
            .map(|job| job.paths)
            .ok_or(WorkerError::Cancelled)?;
        self.logger.log_start(&paths.input);

        let workspace = JobWorkspace::create(paths.clone()).await?;
        match self.run_stages(&workspace, &paths).await {
            Ok(outcome) => {
                workspace.commit().await;
                Ok(outcome)
            }
            Err(e) => {
                workspace.discard().await;
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self, workspace: &JobWorkspace, paths: &JobPaths) -> WorkerResult<JobOutcome> {
        let video = self.ctx.video.as_ref();

        // Trim
        self.enter(Stage::Trim, TRIM_PROGRESS)?;
        if !paths.input.exists() {
            return Err(MediaError::FileNotFound(paths.input.clone()).into());
        }
        let trimmed = workspace.job_dir().join(TRIMMED_FILE);
        video
            .trim(&paths.input, &trimmed, self.ctx.config.trim_max_secs, self.cancel)
            .await?;

        // ResizeIfNeeded
        self.enter(Stage::ResizeIfNeeded, RESIZE_PROGRESS)?;
        let mut info = video.probe(&trimmed).await?;
        let analysis = if info.height > self.ctx.config.max_resolution {
            let resized = workspace.job_dir().join(ANALYSIS_FILE);
            video
                .reduce_resolution(&trimmed, &resized, self.ctx.config.max_resolution, self.cancel)
                .await?;
            info = video.probe(&resized).await?;
            resized
        } else {
            trimmed.clone()
        };
        debug!(
            width = info.width,
            height = info.height,
            fps = info.fps,
            frames = info.frame_count,
            "Analysis video ready"
        );

        // ExtractFrames + PoseExtraction
        let expected = info.frame_count.max(1) as usize;
        let records = self.extract_poses(workspace, &analysis, expected, info.fps).await?;

        // Overlay
        let overlay = workspace.job_dir().join(OVERLAY_FILE);
        self.render_overlay(workspace, &analysis, &records, info.fps, &overlay)
            .await?;

        // ThumbnailAndPreview
        self.enter(Stage::ThumbnailAndPreview, THUMBNAIL_PROGRESS)?;
        let thumbnail = workspace.job_dir().join(THUMBNAIL_FILE);
        let preview = workspace.job_dir().join(PREVIEW_FILE);
        video.generate_thumbnail(&overlay, &thumbnail).await?;
        video
            .generate_preview(&overlay, &preview, self.ctx.config.preview_secs)
            .await?;

        // Finalize
        self.enter(Stage::Finalize, FINALIZE_PROGRESS)?;
        let pose_data = workspace.job_dir().join(POSE_DATA_FILE);
        tokio::fs::write(&pose_data, render_pose_table(&records.records)).await?;

        // Last point where a cancel still discards the results
        self.check_cancelled()?;

        Ok(JobOutcome {
            artifacts: JobArtifacts {
                trimmed_video: Some(trimmed),
                overlay_video: Some(overlay),
                pose_data: Some(pose_data),
                thumbnail: Some(thumbnail),
                preview: Some(preview),
            },
            statistics: records.statistics,
        })
    }

    /// Batched decode and pose selection, followed by the interpolation pass.
    async fn extract_poses(
        &mut self,
        workspace: &JobWorkspace,
        video: &Path,
        expected: usize,
        fps: f64,
    ) -> WorkerResult<PoseRecords> {
        self.enter(Stage::ExtractFrames, POSE_START)?;
        let lease = DetectorLease::acquire(self.ctx.detectors.as_ref(), self.job_id).await?;
        let mut session = PoseSession::new(lease, &self.ctx.pose_config);
        let batch_size = self.ctx.config.batch_size;
        let scratch = workspace.frames_dir().join("batch");

        let mut start = 0;
        loop {
            let progress = span_progress(POSE_START, POSE_END, start, expected);
            self.enter(Stage::ExtractFrames, progress)?;
            let frames = self
                .ctx
                .video
                .extract_frames(video, FrameBatch::new(start, batch_size, fps), &scratch, self.cancel)
                .await?;
            if frames.is_empty() {
                break;
            }

            self.enter(Stage::PoseExtraction, progress)?;
            let decoded = frames.len();
            for (offset, frame) in frames.iter().enumerate() {
                session.process_frame(start + offset, frame).await?;
            }
            drop(frames);

            start += decoded;
            debug!(frames = start, "Pose batch finished");
            if decoded < batch_size {
                break;
            }
        }

        if session.frames_processed() == 0 {
            return Err(MediaError::invalid_video("no frames decoded").into());
        }

        self.enter(Stage::Interpolation, INTERPOLATION_PROGRESS)?;
        let output = session.finish();
        for (bucket, attempted) in &output.strategies_attempted {
            metrics::record_strategies_attempted(*bucket, *attempted);
        }
        metrics::record_frames_processed(output.records.len() as u64);
        metrics::record_interpolated(output.interpolated_landmarks as u64);

        let statistics = output.statistics();
        if statistics.detection_rate < 0.5 {
            self.logger.log_warning(
                Stage::PoseExtraction,
                &format!("Low detection rate: {:.2}", statistics.detection_rate),
            );
        }
        Ok(PoseRecords {
            records: output.records,
            statistics,
        })
    }

    /// Draw the chosen skeleton on every frame and encode the overlay video.
    async fn render_overlay(
        &mut self,
        workspace: &JobWorkspace,
        video: &Path,
        records: &PoseRecords,
        fps: f64,
        output: &Path,
    ) -> WorkerResult<()> {
        self.enter(Stage::Overlay, OVERLAY_START)?;
        let batch_size = self.ctx.config.batch_size;
        let scratch = workspace.frames_dir().join("batch");
        let overlay_dir = workspace.frames_dir().join("overlay");
        tokio::fs::create_dir_all(&overlay_dir).await?;

        let total = records.records.len();
        let mut start = 0;
        while start < total {
            let progress = span_progress(OVERLAY_START, OVERLAY_END, start, total);
            self.enter(Stage::Overlay, progress)?;
            let count = batch_size.min(total - start);
            let frames = self
                .ctx
                .video
                .extract_frames(video, FrameBatch::new(start, count, fps), &scratch, self.cancel)
                .await?;
            if frames.is_empty() {
                break;
            }

            let batch: Vec<(RgbImage, FrameRecord)> = frames
                .into_iter()
                .zip(&records.records[start..])
                .map(|(frame, record)| (frame, record.clone()))
                .collect();
            start += batch.len();
            write_overlay_frames(overlay_dir.clone(), batch).await?;
        }

        self.check_cancelled()?;
        self.ctx
            .video
            .encode_frames(&overlay_dir, fps, output, self.cancel)
            .await?;
        Ok(())
    }

    /// Move to `stage`, reporting `progress`. This is the cancellation point
    /// at every stage and batch boundary.
    fn enter(&mut self, stage: Stage, progress: u8) -> WorkerResult<()> {
        self.check_cancelled()?;
        if stage != self.stage {
            self.finish_stage();
            self.stage = stage;
            self.stage_started = Instant::now();
            self.logger.log_stage(stage, progress);
        }
        match self.ctx.registry.update_progress(self.job_id, progress, stage) {
            Ok(true) => Ok(()),
            // Cancelled or deleted underneath us
            Ok(false) | Err(QueueError::JobNotFound(_)) => Err(WorkerError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }

    fn finish_stage(&self) {
        if self.stage != Stage::Queued {
            metrics::record_stage_duration(self.stage, self.stage_started.elapsed().as_secs_f64());
        }
    }

    fn check_cancelled(&self) -> WorkerResult<()> {
        if self.cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }
}

struct PoseRecords {
    records: Vec<FrameRecord>,
    statistics: JobStatistics,
}

/// Linear progress between `from` and `to` after `done` of `total` frames.
fn span_progress(from: u8, to: u8, done: usize, total: usize) -> u8 {
    let total = total.max(1);
    let fraction = done.min(total) as f64 / total as f64;
    from + ((to - from) as f64 * fraction).round() as u8
}

async fn write_overlay_frames(dir: PathBuf, batch: Vec<(RgbImage, FrameRecord)>) -> WorkerResult<()> {
    tokio::task::spawn_blocking(move || -> WorkerResult<()> {
        for (mut frame, record) in batch {
            draw_skeleton(&mut frame, &record.landmarks);
            frame.save(dir.join(frame_file_name(record.index)))?;
        }
        Ok(())
    })
    .await
    .map_err(|e| WorkerError::internal(format!("overlay task failed: {}", e)))?
}
