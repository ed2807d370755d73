//! Detection strategies and candidate scores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image preprocessing applied before the detector sees a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Identity,
    /// Contrast stretch on the lower half of the frame
    EnhancedLowerBody,
    GaussianBlur,
    BrightnessContrast,
    /// Horizontal flip
    Mirror,
    EnhancedLowerBodyMirror,
    BlurBrightness,
}

impl Variant {
    /// Every variant, in catalogue order.
    pub const ALL: &'static [Variant] = &[
        Variant::Identity,
        Variant::EnhancedLowerBody,
        Variant::GaussianBlur,
        Variant::BrightnessContrast,
        Variant::Mirror,
        Variant::EnhancedLowerBodyMirror,
        Variant::BlurBrightness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Identity => "identity",
            Variant::EnhancedLowerBody => "enhanced_lower_body",
            Variant::GaussianBlur => "gaussian_blur",
            Variant::BrightnessContrast => "brightness_contrast",
            Variant::Mirror => "mirror",
            Variant::EnhancedLowerBodyMirror => "enhanced_lower_body_mirror",
            Variant::BlurBrightness => "blur_brightness",
        }
    }

    /// Whether the detector sees a horizontally flipped image.
    pub fn is_mirrored(&self) -> bool {
        matches!(self, Variant::Mirror | Variant::EnhancedLowerBodyMirror)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings handed to the pose detector for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Short label used in strategy names and statistics
    pub name: String,
    /// Minimum detection confidence
    pub min_confidence: f64,
    /// Model complexity (0 = lite, 1 = full, 2 = heavy)
    pub model_complexity: u8,
    /// Static-image mode; false means tracking mode with history
    pub static_mode: bool,
}

impl DetectorConfig {
    /// Default tracking configuration.
    pub fn tracking() -> Self {
        Self {
            name: "tracking".to_string(),
            min_confidence: 0.5,
            model_complexity: 1,
            static_mode: false,
        }
    }

    /// Static mode, heavy model, lowered threshold.
    pub fn static_precise() -> Self {
        Self {
            name: "static_precise".to_string(),
            min_confidence: 0.3,
            model_complexity: 2,
            static_mode: true,
        }
    }

    /// Static mode, heavy model, permissive threshold for hard frames.
    pub fn static_permissive() -> Self {
        Self {
            name: "static_permissive".to_string(),
            min_confidence: 0.1,
            model_complexity: 2,
            static_mode: true,
        }
    }
}

/// One (preprocessing, detector config) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Position in generation order; lower wins ties
    pub index: usize,
    pub variant: Variant,
    pub detector: DetectorConfig,
}

impl StrategyConfig {
    pub fn label(&self) -> String {
        format!("{}/{}", self.variant, self.detector.name)
    }
}

/// Sub-scores and weighted total for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub visibility: f64,
    pub anatomical: f64,
    pub temporal: f64,
    pub symmetry: f64,
    pub total: f64,
}
