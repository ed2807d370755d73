//! Client for the pose inference service.
//!
//! The service runs the landmark model; this crate wraps its HTTP API and
//! exposes it as a [`gait_pose::PoseDetector`] with one service-side session
//! per job.

pub mod client;
pub mod detector;
pub mod error;
pub mod types;

pub use client::{PoseClient, PoseClientConfig};
pub use detector::{RemoteDetectorFactory, RemotePoseDetector};
pub use error::{MlError, MlResult};
pub use types::{DetectRequest, DetectResponse, HealthResponse};
