//! [`PoseDetector`] backed by the pose service.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use gait_models::{DetectorConfig, JobId, LandmarkSet};
use gait_pose::{DetectorFactory, PoseDetector, PoseResult};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbImage};
use tracing::{debug, warn};

use crate::client::PoseClient;
use crate::error::MlResult;
use crate::types::DetectRequest;

/// Remote detector bound to one service-side session.
pub struct RemotePoseDetector {
    client: Arc<PoseClient>,
    session_id: String,
}

impl RemotePoseDetector {
    pub fn new(client: Arc<PoseClient>, session_id: impl Into<String>) -> Self {
        Self {
            client,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl PoseDetector for RemotePoseDetector {
    async fn detect(
        &mut self,
        image: &RgbImage,
        config: &DetectorConfig,
    ) -> PoseResult<Option<LandmarkSet>> {
        let request = DetectRequest {
            session_id: self.session_id.clone(),
            image: encode_png_base64(image)?,
            config: config.clone(),
        };
        Ok(self.client.detect(&request).await?)
    }

    fn name(&self) -> &'static str {
        "remote"
    }

    fn release(&mut self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(session_id = %self.session_id, "No runtime to close pose session");
            return;
        };
        let client = Arc::clone(&self.client);
        let session_id = self.session_id.clone();
        handle.spawn(async move {
            if let Err(e) = client.close_session(&session_id).await {
                warn!(session_id = %session_id, error = %e, "Failed to close pose session");
            }
        });
    }
}

/// Creates one remote session per job, named after the job id.
pub struct RemoteDetectorFactory {
    client: Arc<PoseClient>,
}

impl RemoteDetectorFactory {
    pub fn new(client: Arc<PoseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DetectorFactory for RemoteDetectorFactory {
    async fn create(&self, job_id: &JobId) -> PoseResult<Box<dyn PoseDetector>> {
        debug!(job_id = %job_id, "Opening remote pose session");
        Ok(Box::new(RemotePoseDetector::new(
            Arc::clone(&self.client),
            job_id.as_str(),
        )))
    }
}

fn encode_png_base64(image: &RgbImage) -> MlResult<String> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
    )?;
    Ok(STANDARD.encode(png))
}
