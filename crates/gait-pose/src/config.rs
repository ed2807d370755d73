//! Configuration for pose selection.
//!
//! Every threshold and weight used by the categorizer, scorer and
//! interpolator lives here so deployments can retune them from a JSON file
//! (`POSE_CONFIG_FILE`) without a rebuild. Missing fields fall back to the
//! defaults below.

use std::path::Path;

use gait_models::{Bucket, DetectorConfig, Variant};
use serde::{Deserialize, Serialize};

use crate::error::{PoseError, PoseResult};

/// Top-level pose configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub scoring: ScoringConfig,
    pub interpolation: InterpolationConfig,
    pub categorizer: CategorizerConfig,
    pub strategies: StrategyCatalog,
    /// Stop trying strategies once a candidate reaches this total score
    pub excellent_score: f64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            interpolation: InterpolationConfig::default(),
            categorizer: CategorizerConfig::default(),
            strategies: StrategyCatalog::default(),
            excellent_score: 0.9,
        }
    }
}

impl PoseConfig {
    /// Load from a JSON file and validate.
    pub fn from_file(path: impl AsRef<Path>) -> PoseResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: PoseConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `POSE_CONFIG_FILE` if set, otherwise defaults.
    pub fn from_env() -> PoseResult<Self> {
        match std::env::var("POSE_CONFIG_FILE") {
            Ok(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> PoseResult<()> {
        self.scoring.validate()?;
        self.interpolation.validate()?;
        self.strategies.validate()?;
        for seed in &self.categorizer.seeded_buckets {
            if seed.start > seed.end {
                return Err(PoseError::config(format!(
                    "seeded range {}..={} is empty",
                    seed.start, seed.end
                )));
            }
        }
        Ok(())
    }
}

/// Weights and penalties of the candidate scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub visibility_weight: f64,
    pub anatomical_weight: f64,
    pub temporal_weight: f64,
    pub symmetry_weight: f64,
    /// Max |left.y - right.y| for shoulders before the tilt penalty applies
    pub shoulder_tilt_limit: f64,
    /// Same check for hips
    pub hip_tilt_limit: f64,
    pub tilt_penalty: f64,
    /// Minimum shorter/longer thigh ratio
    pub thigh_ratio_min: f64,
    pub thigh_penalty: f64,
    /// Normalized per-landmark displacement tolerated between frames
    pub max_displacement: f64,
    pub lower_body_bonus: f64,
    /// Knee and ankle visibility required for the lower-body bonus
    pub lower_body_min_visibility: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            visibility_weight: 0.3,
            anatomical_weight: 0.4,
            temporal_weight: 0.2,
            symmetry_weight: 0.1,
            shoulder_tilt_limit: 0.2,
            hip_tilt_limit: 0.2,
            tilt_penalty: 0.8,
            thigh_ratio_min: 0.7,
            thigh_penalty: 0.7,
            max_displacement: 0.2,
            lower_body_bonus: 1.1,
            lower_body_min_visibility: 0.5,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> PoseResult<()> {
        let weights = [
            self.visibility_weight,
            self.anatomical_weight,
            self.temporal_weight,
            self.symmetry_weight,
        ];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(PoseError::config("scoring weights must be non-negative"));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(PoseError::config(format!(
                "scoring weights must sum to 1.0, got {:.6}",
                sum
            )));
        }
        if self.max_displacement <= 0.0 {
            return Err(PoseError::config("max_displacement must be positive"));
        }
        Ok(())
    }
}

/// Gap interpolation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Landmarks below this visibility are gap candidates
    pub low_threshold: f64,
    /// Landmarks above this visibility may anchor a gap
    pub anchor_threshold: f64,
    /// Longest gap (in frames) that will be filled
    pub max_gap: usize,
    /// Visibility assigned to filled landmarks
    pub filled_visibility: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            low_threshold: 0.3,
            anchor_threshold: 0.7,
            max_gap: 3,
            filled_visibility: 0.5,
        }
    }
}

impl InterpolationConfig {
    pub fn validate(&self) -> PoseResult<()> {
        if self.low_threshold > self.anchor_threshold {
            return Err(PoseError::config(
                "interpolation low_threshold must not exceed anchor_threshold",
            ));
        }
        if !(0.0..=1.0).contains(&self.filled_visibility) {
            return Err(PoseError::config("filled_visibility must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Frame-range override for the categorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeededRange {
    pub start: usize,
    /// Inclusive
    pub end: usize,
    pub bucket: Bucket,
}

/// Thresholds of the default visibility heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizerConfig {
    /// Previous-frame mean visibility at or above which a frame is GOOD
    pub good_visibility: f64,
    /// At or above this (and below good) a frame is MODERATE, else SEVERE
    pub moderate_visibility: f64,
    /// Mean-visibility drop between the two previous frames that escalates
    pub drop_threshold: f64,
    /// Knee visibility needed before crossed legs are trusted
    pub crossed_min_visibility: f64,
    /// Optional known-difficult frame ranges
    pub seeded_buckets: Vec<SeededRange>,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            good_visibility: 0.7,
            moderate_visibility: 0.5,
            drop_threshold: 0.2,
            crossed_min_visibility: 0.3,
            seeded_buckets: Vec::new(),
        }
    }
}

/// Variants and detector configs attempted for one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketPlan {
    pub variants: Vec<Variant>,
    pub detectors: Vec<DetectorConfig>,
}

/// Per-bucket strategy plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyCatalog {
    pub good: BucketPlan,
    pub moderate: BucketPlan,
    pub crossed: BucketPlan,
    pub severe: BucketPlan,
}

impl Default for StrategyCatalog {
    fn default() -> Self {
        let tracking = DetectorConfig::tracking();
        let precise = DetectorConfig::static_precise();
        let permissive = DetectorConfig::static_permissive();

        Self {
            good: BucketPlan {
                variants: vec![Variant::Identity],
                detectors: vec![tracking.clone()],
            },
            moderate: BucketPlan {
                variants: vec![
                    Variant::Identity,
                    Variant::EnhancedLowerBody,
                    Variant::BrightnessContrast,
                ],
                detectors: vec![tracking.clone(), precise.clone()],
            },
            crossed: BucketPlan {
                variants: vec![
                    Variant::Identity,
                    Variant::EnhancedLowerBody,
                    Variant::Mirror,
                    Variant::EnhancedLowerBodyMirror,
                    Variant::GaussianBlur,
                ],
                detectors: vec![tracking.clone(), precise.clone()],
            },
            severe: BucketPlan {
                variants: Variant::ALL.to_vec(),
                detectors: vec![tracking, precise, permissive],
            },
        }
    }
}

impl StrategyCatalog {
    pub fn plan(&self, bucket: Bucket) -> &BucketPlan {
        match bucket {
            Bucket::Good => &self.good,
            Bucket::Moderate => &self.moderate,
            Bucket::Crossed => &self.crossed,
            Bucket::Severe => &self.severe,
        }
    }

    pub fn validate(&self) -> PoseResult<()> {
        for bucket in Bucket::ALL {
            let plan = self.plan(*bucket);
            if plan.variants.is_empty() || plan.detectors.is_empty() {
                return Err(PoseError::config(format!(
                    "bucket {} needs at least one variant and one detector config",
                    bucket
                )));
            }
        }
        Ok(())
    }
}
