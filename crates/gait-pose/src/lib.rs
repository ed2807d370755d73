//! Multi-strategy pose selection engine.
//!
//! This crate provides:
//! - The pose detector seam and per-job detector leases
//! - Frame difficulty triage (pluggable classifiers)
//! - Preprocessing variants crossed with detector configurations
//! - Candidate scoring and deterministic winner selection
//! - Gap interpolation over the finished frame sequence
//! - Skeleton overlay drawing and the pose-data table

pub mod categorizer;
pub mod config;
pub mod detector;
pub mod error;
pub mod interpolate;
pub mod invoker;
pub mod overlay;
pub mod preprocess;
pub mod scorer;
pub mod session;
pub mod table;

pub use categorizer::{build_classifier, FrameClassifier, SeededClassifier, VisibilityClassifier};
pub use config::{
    BucketPlan, CategorizerConfig, InterpolationConfig, PoseConfig, ScoringConfig, SeededRange,
    StrategyCatalog,
};
pub use detector::{DetectorFactory, DetectorLease, PoseDetector};
pub use error::{PoseError, PoseResult};
pub use interpolate::GapInterpolator;
pub use invoker::{Candidate, CandidateSummary, FrameSelection, MultiStrategyInvoker};
pub use overlay::draw_skeleton;
pub use scorer::CandidateScorer;
pub use session::{PoseSession, SessionOutput};
pub use table::render_pose_table;
