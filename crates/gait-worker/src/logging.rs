//! Structured job logging.
//!
//! Every line carries the job id and the stage it was emitted from, so a
//! single job can be followed through the pipeline with one filter.

use gait_models::{JobId, JobStatistics, Stage};
use tracing::{error, info, warn, Span};

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.to_string(),
        }
    }

    pub fn log_start(&self, input: &std::path::Path) {
        info!(job_id = %self.job_id, input = %input.display(), "Job started");
    }

    /// Log entry into a stage.
    pub fn log_stage(&self, stage: Stage, progress: u8) {
        info!(job_id = %self.job_id, stage = %stage, progress, "Stage started");
    }

    pub fn log_warning(&self, stage: Stage, message: &str) {
        warn!(job_id = %self.job_id, stage = %stage, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, "Job failed: {}", message);
    }

    pub fn log_cancelled(&self) {
        info!(job_id = %self.job_id, "Job cancelled");
    }

    pub fn log_completion(&self, stats: &JobStatistics) {
        info!(
            job_id = %self.job_id,
            frames = stats.frames_processed,
            detection_rate = stats.detection_rate,
            avg_confidence = stats.avg_confidence,
            interpolated = stats.interpolated_landmarks,
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span wrapping the whole pipeline run of this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id)
    }
}
