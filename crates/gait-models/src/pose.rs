//! Pose landmarks and per-frame results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};
use crate::strategy::ScoreBreakdown;

/// Number of body landmarks produced by the detector.
pub const LANDMARK_COUNT: usize = 33;

/// Landmark indices of the 33-point body topology.
pub mod landmark_ids {
    pub const NOSE: usize = 0;
    pub const LEFT_EYE_INNER: usize = 1;
    pub const LEFT_EYE: usize = 2;
    pub const LEFT_EYE_OUTER: usize = 3;
    pub const RIGHT_EYE_INNER: usize = 4;
    pub const RIGHT_EYE: usize = 5;
    pub const RIGHT_EYE_OUTER: usize = 6;
    pub const LEFT_EAR: usize = 7;
    pub const RIGHT_EAR: usize = 8;
    pub const MOUTH_LEFT: usize = 9;
    pub const MOUTH_RIGHT: usize = 10;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_PINKY: usize = 17;
    pub const RIGHT_PINKY: usize = 18;
    pub const LEFT_INDEX: usize = 19;
    pub const RIGHT_INDEX: usize = 20;
    pub const LEFT_THUMB: usize = 21;
    pub const RIGHT_THUMB: usize = 22;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
    pub const LEFT_KNEE: usize = 25;
    pub const RIGHT_KNEE: usize = 26;
    pub const LEFT_ANKLE: usize = 27;
    pub const RIGHT_ANKLE: usize = 28;
    pub const LEFT_HEEL: usize = 29;
    pub const RIGHT_HEEL: usize = 30;
    pub const LEFT_FOOT_INDEX: usize = 31;
    pub const RIGHT_FOOT_INDEX: usize = 32;

    /// Left/right counterparts, used to undo a mirrored detection.
    pub const MIRROR_PAIRS: [(usize, usize); 16] = [
        (LEFT_EYE_INNER, RIGHT_EYE_INNER),
        (LEFT_EYE, RIGHT_EYE),
        (LEFT_EYE_OUTER, RIGHT_EYE_OUTER),
        (LEFT_EAR, RIGHT_EAR),
        (MOUTH_LEFT, MOUTH_RIGHT),
        (LEFT_SHOULDER, RIGHT_SHOULDER),
        (LEFT_ELBOW, RIGHT_ELBOW),
        (LEFT_WRIST, RIGHT_WRIST),
        (LEFT_PINKY, RIGHT_PINKY),
        (LEFT_INDEX, RIGHT_INDEX),
        (LEFT_THUMB, RIGHT_THUMB),
        (LEFT_HIP, RIGHT_HIP),
        (LEFT_KNEE, RIGHT_KNEE),
        (LEFT_ANKLE, RIGHT_ANKLE),
        (LEFT_HEEL, RIGHT_HEEL),
        (LEFT_FOOT_INDEX, RIGHT_FOOT_INDEX),
    ];

    /// Lower-body landmarks (hips down).
    pub const LOWER_BODY: [usize; 10] = [
        LEFT_HIP,
        RIGHT_HIP,
        LEFT_KNEE,
        RIGHT_KNEE,
        LEFT_ANKLE,
        RIGHT_ANKLE,
        LEFT_HEEL,
        RIGHT_HEEL,
        LEFT_FOOT_INDEX,
        RIGHT_FOOT_INDEX,
    ];
}

/// A single body joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Fixed body-joint index (0-32)
    pub id: u8,
    /// Normalized horizontal position
    pub x: f64,
    /// Normalized vertical position
    pub y: f64,
    /// Relative depth
    pub z: f64,
    /// Detector confidence in [0, 1]
    pub visibility: f64,
    /// Set only by the gap interpolator
    #[serde(default)]
    pub interpolated: bool,
}

impl Landmark {
    /// Create a detected landmark. Visibility is clamped to [0, 1].
    pub fn new(id: u8, x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self {
            id,
            x,
            y,
            z,
            visibility: clamp_unit(visibility),
            interpolated: false,
        }
    }

    /// Euclidean distance to another landmark in the image plane.
    pub fn distance_2d(&self, other: &Landmark) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// An ordered set of exactly [`LANDMARK_COUNT`] landmarks for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    landmarks: Vec<Landmark>,
    /// False when the detector found no person and the set is a placeholder
    detected: bool,
}

impl LandmarkSet {
    /// Build a detected set, validating count and ordering.
    pub fn new(landmarks: Vec<Landmark>) -> ModelResult<Self> {
        if landmarks.len() != LANDMARK_COUNT {
            return Err(ModelError::invalid_landmarks(format!(
                "expected {} landmarks, got {}",
                LANDMARK_COUNT,
                landmarks.len()
            )));
        }
        if let Some((i, lm)) = landmarks
            .iter()
            .enumerate()
            .find(|(i, lm)| lm.id as usize != *i)
        {
            return Err(ModelError::invalid_landmarks(format!(
                "landmark at position {} has id {}",
                i, lm.id
            )));
        }

        let landmarks = landmarks
            .into_iter()
            .map(|mut lm| {
                lm.visibility = clamp_unit(lm.visibility);
                lm
            })
            .collect();

        Ok(Self {
            landmarks,
            detected: true,
        })
    }

    /// Placeholder for a frame where nothing was found: all visibilities 0.
    pub fn undetected() -> Self {
        Self {
            landmarks: (0..LANDMARK_COUNT)
                .map(|id| Landmark::new(id as u8, 0.0, 0.0, 0.0, 0.0))
                .collect(),
            detected: false,
        }
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn get(&self, id: usize) -> &Landmark {
        &self.landmarks[id]
    }

    pub fn get_mut(&mut self, id: usize) -> &mut Landmark {
        &mut self.landmarks[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter()
    }

    /// Mean visibility over all landmarks.
    pub fn mean_visibility(&self) -> f64 {
        self.landmarks.iter().map(|lm| lm.visibility).sum::<f64>() / LANDMARK_COUNT as f64
    }

    /// Mean visibility over a subset of landmark ids.
    pub fn mean_visibility_of(&self, ids: &[usize]) -> f64 {
        if ids.is_empty() {
            return 0.0;
        }
        ids.iter().map(|&id| self.landmarks[id].visibility).sum::<f64>() / ids.len() as f64
    }

    /// Number of landmarks filled by interpolation.
    pub fn interpolated_count(&self) -> usize {
        self.landmarks.iter().filter(|lm| lm.interpolated).count()
    }

    /// Map a detection made on a horizontally mirrored image back to the
    /// original frame: x is flipped and left/right joints swap places so
    /// ids keep their anatomical meaning.
    pub fn unmirrored(&self) -> Self {
        let mut landmarks: Vec<Landmark> = self
            .landmarks
            .iter()
            .map(|lm| Landmark { x: 1.0 - lm.x, ..*lm })
            .collect();

        for (left, right) in landmark_ids::MIRROR_PAIRS {
            landmarks.swap(left, right);
            landmarks[left].id = left as u8;
            landmarks[right].id = right as u8;
        }

        Self {
            landmarks,
            detected: self.detected,
        }
    }
}

/// Frame difficulty class controlling how many strategies are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Good,
    Moderate,
    Crossed,
    Severe,
}

impl Bucket {
    pub const ALL: &'static [Bucket] = &[Bucket::Good, Bucket::Moderate, Bucket::Crossed, Bucket::Severe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Good => "good",
            Bucket::Moderate => "moderate",
            Bucket::Crossed => "crossed",
            Bucket::Severe => "severe",
        }
    }

    /// Next harder bucket (SEVERE saturates).
    pub fn escalate(self) -> Self {
        match self {
            Bucket::Good => Bucket::Moderate,
            Bucket::Moderate => Bucket::Crossed,
            Bucket::Crossed | Bucket::Severe => Bucket::Severe,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub index: usize,
    pub bucket: Bucket,
    /// Label of the winning strategy, None when nothing was detected
    pub strategy: Option<String>,
    pub score: Option<ScoreBreakdown>,
    /// Number of candidates evaluated for this frame
    pub candidates_evaluated: usize,
    pub landmarks: LandmarkSet,
}

impl FrameRecord {
    /// Record for a frame where no strategy produced a person.
    pub fn undetected(index: usize, bucket: Bucket, candidates_evaluated: usize) -> Self {
        Self {
            index,
            bucket,
            strategy: None,
            score: None,
            candidates_evaluated,
            landmarks: LandmarkSet::undetected(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landmark_ids::*;

    fn uniform(visibility: f64) -> LandmarkSet {
        LandmarkSet::new(
            (0..LANDMARK_COUNT)
                .map(|id| Landmark::new(id as u8, 0.5, 0.5, 0.0, visibility))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_landmark_set_requires_33() {
        let short: Vec<Landmark> = (0..10).map(|id| Landmark::new(id, 0.0, 0.0, 0.0, 1.0)).collect();
        assert!(LandmarkSet::new(short).is_err());
    }

    #[test]
    fn test_landmark_set_requires_order() {
        let mut lms: Vec<Landmark> = (0..LANDMARK_COUNT)
            .map(|id| Landmark::new(id as u8, 0.0, 0.0, 0.0, 1.0))
            .collect();
        lms.swap(3, 4);
        assert!(LandmarkSet::new(lms).is_err());
    }

    #[test]
    fn test_visibility_clamped() {
        let lm = Landmark::new(0, 0.1, 0.2, 0.0, 1.7);
        assert_eq!(lm.visibility, 1.0);
        let lm = Landmark::new(0, 0.1, 0.2, 0.0, f64::NAN);
        assert_eq!(lm.visibility, 0.0);
    }

    #[test]
    fn test_mean_visibility() {
        let set = uniform(0.9);
        assert!((set.mean_visibility() - 0.9).abs() < 1e-9);
        assert!(set.is_detected());

        let none = LandmarkSet::undetected();
        assert!(!none.is_detected());
        assert_eq!(none.mean_visibility(), 0.0);
    }

    #[test]
    fn test_unmirrored_flips_and_swaps() {
        let mut lms: Vec<Landmark> = (0..LANDMARK_COUNT)
            .map(|id| Landmark::new(id as u8, 0.5, 0.5, 0.0, 0.5))
            .collect();
        lms[LEFT_KNEE] = Landmark::new(LEFT_KNEE as u8, 0.2, 0.7, 0.0, 0.9);
        lms[RIGHT_KNEE] = Landmark::new(RIGHT_KNEE as u8, 0.4, 0.7, 0.0, 0.3);
        let set = LandmarkSet::new(lms).unwrap();

        let restored = set.unmirrored();
        // Mirrored "left knee" at 0.2 is the real right knee at 0.8
        assert!((restored.get(RIGHT_KNEE).x - 0.8).abs() < 1e-9);
        assert!((restored.get(RIGHT_KNEE).visibility - 0.9).abs() < 1e-9);
        assert!((restored.get(LEFT_KNEE).x - 0.6).abs() < 1e-9);
        assert_eq!(restored.get(LEFT_KNEE).id as usize, LEFT_KNEE);

        let twice = restored.unmirrored();
        assert!((twice.get(LEFT_KNEE).x - 0.2).abs() < 1e-9);
        assert!((twice.get(LEFT_KNEE).visibility - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_bucket_escalation() {
        assert_eq!(Bucket::Good.escalate(), Bucket::Moderate);
        assert_eq!(Bucket::Moderate.escalate(), Bucket::Crossed);
        assert_eq!(Bucket::Severe.escalate(), Bucket::Severe);
        assert!(Bucket::Severe > Bucket::Good);
    }
}
