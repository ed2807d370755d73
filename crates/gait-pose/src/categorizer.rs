//! Frame difficulty triage.
//!
//! A bucket only decides how many strategies are attempted for a frame; it
//! never changes which candidate wins among those evaluated.

use gait_models::landmark_ids::{LEFT_HIP, LEFT_KNEE, RIGHT_HIP, RIGHT_KNEE};
use gait_models::{Bucket, LandmarkSet};
use image::RgbImage;

use crate::config::{CategorizerConfig, SeededRange};

/// Assigns a difficulty bucket to a frame.
///
/// `history` holds the most recently chosen landmark sets, oldest first.
pub trait FrameClassifier: Send + Sync {
    fn classify(&self, frame_index: usize, frame: &RgbImage, history: &[LandmarkSet]) -> Bucket;
}

/// Default heuristic driven by the previous frames' visibility.
#[derive(Debug, Clone)]
pub struct VisibilityClassifier {
    config: CategorizerConfig,
}

impl VisibilityClassifier {
    pub fn new(config: CategorizerConfig) -> Self {
        Self { config }
    }

    fn base_bucket(&self, previous: &LandmarkSet) -> Bucket {
        let visibility = previous.mean_visibility();
        if visibility >= self.config.good_visibility {
            Bucket::Good
        } else if visibility >= self.config.moderate_visibility {
            Bucket::Moderate
        } else {
            Bucket::Severe
        }
    }

    /// Knees whose left/right order is the opposite of the hips'.
    fn knees_crossed(&self, set: &LandmarkSet) -> bool {
        if !set.is_detected() {
            return false;
        }
        let min_vis = self.config.crossed_min_visibility;
        let (lk, rk) = (set.get(LEFT_KNEE), set.get(RIGHT_KNEE));
        if lk.visibility < min_vis || rk.visibility < min_vis {
            return false;
        }
        let hip_order = set.get(LEFT_HIP).x - set.get(RIGHT_HIP).x;
        let knee_order = lk.x - rk.x;
        hip_order * knee_order < 0.0
    }
}

impl Default for VisibilityClassifier {
    fn default() -> Self {
        Self::new(CategorizerConfig::default())
    }
}

impl FrameClassifier for VisibilityClassifier {
    fn classify(&self, _frame_index: usize, _frame: &RgbImage, history: &[LandmarkSet]) -> Bucket {
        let Some(previous) = history.last() else {
            return Bucket::Good;
        };

        let mut bucket = self.base_bucket(previous);
        if self.knees_crossed(previous) {
            bucket = bucket.max(Bucket::Crossed);
        }

        if history.len() >= 2 {
            let before = &history[history.len() - 2];
            let drop = before.mean_visibility() - previous.mean_visibility();
            if drop > self.config.drop_threshold {
                bucket = bucket.escalate();
            }
        }

        bucket
    }
}

/// Frame-range table consulted before falling back to another classifier.
pub struct SeededClassifier<C> {
    ranges: Vec<SeededRange>,
    fallback: C,
}

impl<C: FrameClassifier> SeededClassifier<C> {
    pub fn new(ranges: Vec<SeededRange>, fallback: C) -> Self {
        Self { ranges, fallback }
    }

    fn lookup(&self, frame_index: usize) -> Option<Bucket> {
        self.ranges
            .iter()
            .find(|r| (r.start..=r.end).contains(&frame_index))
            .map(|r| r.bucket)
    }
}

impl<C: FrameClassifier> FrameClassifier for SeededClassifier<C> {
    fn classify(&self, frame_index: usize, frame: &RgbImage, history: &[LandmarkSet]) -> Bucket {
        self.lookup(frame_index)
            .unwrap_or_else(|| self.fallback.classify(frame_index, frame, history))
    }
}

/// Build the classifier described by `config`.
pub fn build_classifier(config: &CategorizerConfig) -> Box<dyn FrameClassifier> {
    let heuristic = VisibilityClassifier::new(config.clone());
    if config.seeded_buckets.is_empty() {
        Box::new(heuristic)
    } else {
        Box::new(SeededClassifier::new(config.seeded_buckets.clone(), heuristic))
    }
}
