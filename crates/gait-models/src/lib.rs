//! Shared data models for GaitLab.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle status and statistics
//! - Pipeline stages and job errors
//! - Pose landmarks, landmark sets and difficulty buckets
//! - Detection strategies and candidate score breakdowns

pub mod error;
pub mod job;
pub mod pose;
pub mod stage;
pub mod strategy;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobArtifacts, JobError, JobErrorKind, JobId, JobPaths, JobStatistics, JobStatus};
pub use pose::{landmark_ids, Bucket, FrameRecord, Landmark, LandmarkSet, LANDMARK_COUNT};
pub use stage::Stage;
pub use strategy::{DetectorConfig, ScoreBreakdown, StrategyConfig, Variant};
