//! Pose detector seam.
//!
//! The detector is an external collaborator: it maps an image and a
//! [`DetectorConfig`] to either "no person" or exactly 33 ordered landmarks.
//! Static mode is pure; tracking mode keeps history, which is why every job
//! leases its own instance through a [`DetectorFactory`].

use std::ops::{Deref, DerefMut};

use async_trait::async_trait;
use gait_models::{DetectorConfig, JobId, LandmarkSet};
use image::RgbImage;
use tracing::debug;

use crate::error::PoseResult;

/// Pose detector instance.
#[async_trait]
pub trait PoseDetector: Send {
    /// Detect a single person.
    ///
    /// `Ok(None)` means no person was found, which is a normal outcome.
    async fn detect(
        &mut self,
        image: &RgbImage,
        config: &DetectorConfig,
    ) -> PoseResult<Option<LandmarkSet>>;

    /// Detector name for logging.
    fn name(&self) -> &'static str;

    /// Release held resources (sessions, model handles). Called exactly once
    /// by [`DetectorLease`] when it drops.
    fn release(&mut self) {}
}

/// Creates one detector instance per job.
#[async_trait]
pub trait DetectorFactory: Send + Sync {
    async fn create(&self, job_id: &JobId) -> PoseResult<Box<dyn PoseDetector>>;
}

/// Scoped ownership of a detector. Releases it on every exit path.
pub struct DetectorLease {
    detector: Box<dyn PoseDetector>,
    owner: JobId,
}

impl DetectorLease {
    /// Acquire a fresh detector for `job_id`.
    pub async fn acquire(factory: &dyn DetectorFactory, job_id: &JobId) -> PoseResult<Self> {
        let detector = factory.create(job_id).await?;
        debug!(job_id = %job_id, detector = detector.name(), "Detector acquired");
        Ok(Self {
            detector,
            owner: job_id.clone(),
        })
    }

    pub fn owner(&self) -> &JobId {
        &self.owner
    }
}

impl Deref for DetectorLease {
    type Target = dyn PoseDetector;

    fn deref(&self) -> &Self::Target {
        self.detector.as_ref()
    }
}

impl DerefMut for DetectorLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.detector.as_mut()
    }
}

impl Drop for DetectorLease {
    fn drop(&mut self) {
        self.detector.release();
        debug!(job_id = %self.owner, detector = self.detector.name(), "Detector released");
    }
}
