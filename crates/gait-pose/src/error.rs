//! Error types for pose selection.

use thiserror::Error;

/// Result type for pose operations.
pub type PoseResult<T> = Result<T, PoseError>;

/// Errors that can occur while selecting poses.
#[derive(Debug, Error)]
pub enum PoseError {
    #[error("Pose detection failed: {0}")]
    DetectionFailed(String),

    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("Invalid pose configuration: {0}")]
    Config(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Model error: {0}")]
    Model(#[from] gait_models::ModelError),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoseError {
    /// Create a detection failure error.
    pub fn detection_failed(message: impl Into<String>) -> Self {
        Self::DetectionFailed(message.into())
    }

    pub fn detector_unavailable(message: impl Into<String>) -> Self {
        Self::DetectorUnavailable(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
