//! Pose service request/response types.

use gait_models::{DetectorConfig, Landmark};
use serde::{Deserialize, Serialize};

/// Single-image detection request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest {
    /// Per-job session; tracking-mode history is kept per session
    pub session_id: String,
    /// Base64-encoded PNG
    pub image: String,
    pub config: DetectorConfig,
}

/// Detection response. `landmarks` is null when no person was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub landmarks: Option<Vec<Landmark>>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
}
