//! Worker error types.

use gait_models::{JobError, Stage};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{stage} failed: {message}")]
    StageFailed { stage: Stage, message: String },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Pose error: {0}")]
    Pose(#[from] gait_pose::PoseError),

    #[error("Media error: {0}")]
    Media(#[from] gait_media::MediaError),

    #[error("Pose service error: {0}")]
    Ml(#[from] gait_ml_client::MlError),

    #[error("Queue error: {0}")]
    Queue(#[from] gait_queue::QueueError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn stage_failed(stage: Stage, message: impl Into<String>) -> Self {
        Self::StageFailed {
            stage,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error came from a cancellation request, including one
    /// that interrupted an FFmpeg process.
    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled => true,
            WorkerError::Media(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Error to record on the FAILED job.
    pub fn to_job_error(&self) -> JobError {
        match self {
            WorkerError::StageFailed { stage, message } => JobError::stage_failure(*stage, message.clone()),
            other => JobError::internal(other.to_string()),
        }
    }
}
