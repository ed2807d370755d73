//! Pose service HTTP client.

use std::time::Duration;

use gait_models::{Landmark, LandmarkSet};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{MlError, MlResult};
use crate::types::{DetectRequest, DetectResponse, HealthResponse};

/// Configuration for the pose client.
#[derive(Debug, Clone)]
pub struct PoseClientConfig {
    /// Base URL of the pose service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient failures
    pub max_retries: u32,
    /// First retry delay; doubles on each attempt
    pub retry_backoff: Duration,
}

impl Default for PoseClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl PoseClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("POSE_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("POSE_SERVICE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("POSE_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_backoff: defaults.retry_backoff,
        }
    }
}

/// Client for the pose service.
pub struct PoseClient {
    http: Client,
    config: PoseClientConfig,
}

impl PoseClient {
    pub fn new(config: PoseClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> MlResult<Self> {
        Self::new(PoseClientConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the pose service is healthy.
    pub async fn health_check(&self) -> MlResult<bool> {
        match self.http.get(self.url("health")).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Pose service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Pose service health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Detect a person in one image. `Ok(None)` when nobody was found.
    pub async fn detect(&self, request: &DetectRequest) -> MlResult<Option<LandmarkSet>> {
        let url = self.url("detect");

        let response: DetectResponse = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .json(request)
                    .send()
                    .await
                    .map_err(MlError::Network)?;
                check_status(response)
                    .await?
                    .json::<DetectResponse>()
                    .await
                    .map_err(MlError::Network)
            })
            .await?;

        let Some(landmarks) = response.landmarks else {
            return Ok(None);
        };

        // The interpolated flag belongs to this side of the wire
        let landmarks: Vec<Landmark> = landmarks
            .into_iter()
            .map(|lm| Landmark::new(lm.id, lm.x, lm.y, lm.z, lm.visibility))
            .collect();
        LandmarkSet::new(landmarks)
            .map(Some)
            .map_err(|e| MlError::InvalidResponse(e.to_string()))
    }

    /// Drop service-side tracking state for a session.
    pub async fn close_session(&self, session_id: &str) -> MlResult<()> {
        let url = self.url(&format!("sessions/{}", session_id));
        debug!(session_id, "Closing pose session");
        let response = self.http.delete(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        Ok(())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> MlResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_backoff * 2u32.pow(attempt);
                    warn!(
                        "Pose request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> MlResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS {
        Err(MlError::ServiceUnavailable(format!("{}: {}", status, body)))
    } else {
        Err(MlError::RequestFailed(format!(
            "Pose service returned {}: {}",
            status, body
        )))
    }
}
