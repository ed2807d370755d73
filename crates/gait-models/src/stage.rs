//! Pipeline stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stage of the per-job processing pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for a worker slot
    Queued,
    /// Cut the upload to the analysed window
    Trim,
    /// Downscale when the source exceeds the analysis resolution
    ResizeIfNeeded,
    /// Decode a batch of frames
    ExtractFrames,
    /// Run the multi-strategy detector over a batch
    PoseExtraction,
    /// Fill short low-confidence gaps
    Interpolation,
    /// Draw the skeleton and encode the overlay video
    Overlay,
    /// Thumbnail and short preview from the overlay
    ThumbnailAndPreview,
    /// Write the pose-data table and statistics
    Finalize,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: &'static [Stage] = &[
        Stage::Queued,
        Stage::Trim,
        Stage::ResizeIfNeeded,
        Stage::ExtractFrames,
        Stage::PoseExtraction,
        Stage::Interpolation,
        Stage::Overlay,
        Stage::ThumbnailAndPreview,
        Stage::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Trim => "trim",
            Stage::ResizeIfNeeded => "resize_if_needed",
            Stage::ExtractFrames => "extract_frames",
            Stage::PoseExtraction => "pose_extraction",
            Stage::Interpolation => "interpolation",
            Stage::Overlay => "overlay",
            Stage::ThumbnailAndPreview => "thumbnail_and_preview",
            Stage::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
