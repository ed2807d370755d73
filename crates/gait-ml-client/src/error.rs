//! Pose service client error types.

use gait_pose::PoseError;
use thiserror::Error;

pub type MlResult<T> = Result<T, MlError>;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Pose service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image encode error: {0}")]
    Encode(#[from] image::ImageError),
}

impl MlError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, MlError::ServiceUnavailable(_) | MlError::Network(_))
    }
}

impl From<MlError> for PoseError {
    /// Transport failures make the detector unavailable; a bad answer for one
    /// image only fails that detection.
    fn from(err: MlError) -> Self {
        match err {
            MlError::ServiceUnavailable(_) | MlError::Network(_) => {
                PoseError::detector_unavailable(err.to_string())
            }
            MlError::RequestFailed(_)
            | MlError::InvalidResponse(_)
            | MlError::Json(_)
            | MlError::Encode(_) => PoseError::detection_failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_error_mapping() {
        let unavailable: PoseError = MlError::ServiceUnavailable("503".into()).into();
        assert!(matches!(unavailable, PoseError::DetectorUnavailable(_)));

        let bad: PoseError = MlError::InvalidResponse("12 landmarks".into()).into();
        assert!(matches!(bad, PoseError::DetectionFailed(_)));
    }
}
