//! Candidate scoring.
//!
//! `total = w_v * visibility + w_a * anatomical + w_t * temporal + w_s * symmetry`,
//! multiplied by the lower-body bonus when one leg is clearly visible.

use gait_models::landmark_ids::*;
use gait_models::{LandmarkSet, ScoreBreakdown};

use crate::config::ScoringConfig;

/// Limb segments compared left against right for symmetry.
const LIMB_PAIRS: [((usize, usize), (usize, usize)); 4] = [
    ((LEFT_SHOULDER, LEFT_ELBOW), (RIGHT_SHOULDER, RIGHT_ELBOW)),
    ((LEFT_ELBOW, LEFT_WRIST), (RIGHT_ELBOW, RIGHT_WRIST)),
    ((LEFT_HIP, LEFT_KNEE), (RIGHT_HIP, RIGHT_KNEE)),
    ((LEFT_KNEE, LEFT_ANKLE), (RIGHT_KNEE, RIGHT_ANKLE)),
];

const ZERO_LENGTH: f64 = 1e-9;

/// Scores candidate landmark sets against the previously chosen frame.
#[derive(Debug, Clone, Default)]
pub struct CandidateScorer {
    config: ScoringConfig,
}

impl CandidateScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, candidate: &LandmarkSet, previous: Option<&LandmarkSet>) -> ScoreBreakdown {
        let c = &self.config;
        let visibility = visibility_score(candidate);
        let anatomical = self.anatomical_score(candidate);
        let temporal = self.temporal_score(candidate, previous);
        let symmetry = symmetry_score(candidate);

        let mut total = c.visibility_weight * visibility
            + c.anatomical_weight * anatomical
            + c.temporal_weight * temporal
            + c.symmetry_weight * symmetry;
        if self.lower_body_visible(candidate) {
            total *= c.lower_body_bonus;
        }

        ScoreBreakdown {
            visibility,
            anatomical,
            temporal,
            symmetry,
            total,
        }
    }

    /// Penalizes tilted shoulders or hips and mismatched thighs.
    pub fn anatomical_score(&self, set: &LandmarkSet) -> f64 {
        let c = &self.config;
        let mut score = 1.0;

        if (set.get(LEFT_SHOULDER).y - set.get(RIGHT_SHOULDER).y).abs() > c.shoulder_tilt_limit {
            score *= c.tilt_penalty;
        }
        if (set.get(LEFT_HIP).y - set.get(RIGHT_HIP).y).abs() > c.hip_tilt_limit {
            score *= c.tilt_penalty;
        }

        let left = set.get(LEFT_HIP).distance_2d(set.get(LEFT_KNEE));
        let right = set.get(RIGHT_HIP).distance_2d(set.get(RIGHT_KNEE));
        if length_ratio(left, right) < c.thigh_ratio_min {
            score *= c.thigh_penalty;
        }

        score
    }

    pub fn temporal_score(&self, set: &LandmarkSet, previous: Option<&LandmarkSet>) -> f64 {
        let Some(previous) = previous.filter(|p| p.is_detected()) else {
            return 1.0;
        };

        let max_displacement = set
            .iter()
            .zip(previous.iter())
            .map(|(a, b)| a.distance_2d(b))
            .fold(0.0_f64, f64::max);

        let limit = self.config.max_displacement;
        if max_displacement <= limit {
            1.0
        } else {
            (limit / max_displacement).min(1.0)
        }
    }

    /// Knee and ankle of at least one side both above the bonus threshold.
    pub fn lower_body_visible(&self, set: &LandmarkSet) -> bool {
        let min = self.config.lower_body_min_visibility;
        let side = |knee: usize, ankle: usize| {
            set.get(knee).visibility > min && set.get(ankle).visibility > min
        };
        side(LEFT_KNEE, LEFT_ANKLE) || side(RIGHT_KNEE, RIGHT_ANKLE)
    }
}

pub fn visibility_score(set: &LandmarkSet) -> f64 {
    set.mean_visibility()
}

/// Mean shorter/longer length ratio over the arm and leg segments.
pub fn symmetry_score(set: &LandmarkSet) -> f64 {
    let total: f64 = LIMB_PAIRS
        .iter()
        .map(|((la, lb), (ra, rb))| {
            let left = set.get(*la).distance_2d(set.get(*lb));
            let right = set.get(*ra).distance_2d(set.get(*rb));
            length_ratio(left, right)
        })
        .sum();
    total / LIMB_PAIRS.len() as f64
}

fn length_ratio(a: f64, b: f64) -> f64 {
    let longer = a.max(b);
    if longer < ZERO_LENGTH {
        return 1.0;
    }
    a.min(b) / longer
}

#[cfg(test)]
mod tests {
    use super::*;
    use gait_models::{Landmark, LANDMARK_COUNT};

    /// Upright, symmetric figure facing the camera.
    fn standing(visibility: f64) -> Vec<Landmark> {
        let mut lms: Vec<Landmark> = (0..LANDMARK_COUNT)
            .map(|id| Landmark::new(id as u8, 0.5, 0.2, 0.0, visibility))
            .collect();
        let mut put = |id: usize, x: f64, y: f64| {
            lms[id].x = x;
            lms[id].y = y;
        };
        put(LEFT_SHOULDER, 0.6, 0.3);
        put(RIGHT_SHOULDER, 0.4, 0.3);
        put(LEFT_ELBOW, 0.62, 0.42);
        put(RIGHT_ELBOW, 0.38, 0.42);
        put(LEFT_WRIST, 0.63, 0.52);
        put(RIGHT_WRIST, 0.37, 0.52);
        put(LEFT_HIP, 0.56, 0.55);
        put(RIGHT_HIP, 0.44, 0.55);
        put(LEFT_KNEE, 0.57, 0.7);
        put(RIGHT_KNEE, 0.43, 0.7);
        put(LEFT_ANKLE, 0.57, 0.85);
        put(RIGHT_ANKLE, 0.43, 0.85);
        lms
    }

    fn set(lms: Vec<Landmark>) -> LandmarkSet {
        LandmarkSet::new(lms).unwrap()
    }

    #[test]
    fn test_clean_pose_scores_full_marks() {
        let scorer = CandidateScorer::default();
        let score = scorer.score(&set(standing(0.4)), None);
        assert!((score.visibility - 0.4).abs() < 1e-9);
        assert!((score.anatomical - 1.0).abs() < 1e-9);
        assert!((score.temporal - 1.0).abs() < 1e-9);
        assert!((score.symmetry - 1.0).abs() < 1e-9);
        // No bonus: knees/ankles at 0.4
        let expected = 0.3 * 0.4 + 0.4 + 0.2 + 0.1;
        assert!((score.total - expected).abs() < 1e-9);
    }

    #[test]
    fn test_lower_body_bonus() {
        let scorer = CandidateScorer::default();
        let mut lms = standing(0.4);
        lms[RIGHT_KNEE].visibility = 0.8;
        lms[RIGHT_ANKLE].visibility = 0.8;
        let candidate = set(lms);
        assert!(scorer.lower_body_visible(&candidate));

        let score = scorer.score(&candidate, None);
        let base = 0.3 * candidate.mean_visibility() + 0.4 + 0.2 + 0.1;
        assert!((score.total - base * 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_bonus_requires_same_side() {
        let scorer = CandidateScorer::default();
        let mut lms = standing(0.4);
        lms[LEFT_KNEE].visibility = 0.9;
        lms[RIGHT_ANKLE].visibility = 0.9;
        assert!(!scorer.lower_body_visible(&set(lms)));
    }

    #[test]
    fn test_anatomical_penalties_compound() {
        let scorer = CandidateScorer::default();
        let mut lms = standing(0.9);
        lms[LEFT_SHOULDER].y = 0.05;
        lms[LEFT_HIP].y = 0.8;
        // Left thigh is now shorter than the right one
        let score = scorer.anatomical_score(&set(lms));
        assert!((score - 0.8 * 0.8 * 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_temporal_displacement() {
        let scorer = CandidateScorer::default();
        let previous = set(standing(0.9));
        let mut moved = standing(0.9);
        moved[LEFT_WRIST].x += 0.4;
        let score = scorer.temporal_score(&set(moved), Some(&previous));
        assert!((score - 0.5).abs() < 1e-9);

        assert_eq!(
            scorer.temporal_score(&previous, Some(&LandmarkSet::undetected())),
            1.0
        );
    }

    #[test]
    fn test_symmetry_of_degenerate_pose() {
        // Every landmark at the same point: all pairs zero length
        let lms: Vec<Landmark> = (0..LANDMARK_COUNT)
            .map(|id| Landmark::new(id as u8, 0.5, 0.5, 0.0, 0.5))
            .collect();
        assert_eq!(symmetry_score(&set(lms)), 1.0);
    }

    #[test]
    fn test_symmetry_penalizes_short_limb() {
        let mut lms = standing(0.9);
        lms[RIGHT_ANKLE].y = 0.775;
        let score = symmetry_score(&set(lms));
        // Shin ratio 0.075 / 0.15 = 0.5, others 1.0
        assert!((score - 0.875).abs() < 1e-9);
    }
}
