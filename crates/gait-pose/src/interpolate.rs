//! Gap interpolation over a finished frame sequence.

use gait_models::{FrameRecord, LandmarkSet, LANDMARK_COUNT};
use tracing::debug;

use crate::config::InterpolationConfig;

/// Fills short low-visibility runs from high-visibility neighbours.
#[derive(Debug, Clone, Default)]
pub struct GapInterpolator {
    config: InterpolationConfig,
}

impl GapInterpolator {
    pub fn new(config: InterpolationConfig) -> Self {
        Self { config }
    }

    /// Fill gaps in place and return the number of landmarks filled.
    ///
    /// Anchors are read from a snapshot taken before any write, so a filled
    /// landmark never anchors another gap. `records` must be ordered by frame.
    pub fn fill_gaps(&self, records: &mut [FrameRecord]) -> usize {
        let snapshot: Vec<LandmarkSet> = records.iter().map(|r| r.landmarks.clone()).collect();
        let mut filled = 0;

        for (frame, record) in records.iter_mut().enumerate() {
            for id in 0..LANDMARK_COUNT {
                if snapshot[frame].get(id).visibility >= self.config.low_threshold {
                    continue;
                }
                let Some((prev, next)) = self.anchors(&snapshot, frame, id) else {
                    continue;
                };

                let a = snapshot[prev].get(id);
                let b = snapshot[next].get(id);
                let alpha = (frame - prev) as f64 / (next - prev) as f64;

                let lm = record.landmarks.get_mut(id);
                lm.x = a.x + (b.x - a.x) * alpha;
                lm.y = a.y + (b.y - a.y) * alpha;
                lm.z = a.z + (b.z - a.z) * alpha;
                lm.visibility = self.config.filled_visibility;
                lm.interpolated = true;
                filled += 1;
            }
        }

        if filled > 0 {
            debug!(frames = records.len(), filled, "Interpolated landmark gaps");
        }
        filled
    }

    /// Nearest anchor on each side of `frame`, both within the gap bound.
    fn anchors(&self, snapshot: &[LandmarkSet], frame: usize, id: usize) -> Option<(usize, usize)> {
        let max_gap = self.config.max_gap;
        let is_anchor = |f: usize| snapshot[f].get(id).visibility > self.config.anchor_threshold;

        let prev = (frame.saturating_sub(max_gap)..frame).rev().find(|&f| is_anchor(f))?;
        let last = (frame + max_gap).min(snapshot.len().saturating_sub(1));
        let next = (frame + 1..=last).find(|&f| is_anchor(f))?;

        (next - prev - 1 <= max_gap).then_some((prev, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gait_models::landmark_ids::LEFT_KNEE;
    use gait_models::{Bucket, Landmark};

    fn record(index: usize, knee: (f64, f64)) -> FrameRecord {
        let lms: Vec<Landmark> = (0..LANDMARK_COUNT)
            .map(|id| {
                if id == LEFT_KNEE {
                    Landmark::new(id as u8, knee.0, 0.6, 0.0, knee.1)
                } else {
                    Landmark::new(id as u8, 0.5, 0.5, 0.0, 0.9)
                }
            })
            .collect();
        FrameRecord {
            index,
            bucket: Bucket::Good,
            strategy: Some("identity/tracking".to_string()),
            score: None,
            candidates_evaluated: 1,
            landmarks: LandmarkSet::new(lms).unwrap(),
        }
    }

    /// Knee visibility per frame; x moves 0.1 per frame.
    fn sequence(visibilities: &[f64]) -> Vec<FrameRecord> {
        visibilities
            .iter()
            .enumerate()
            .map(|(i, v)| record(i, (0.1 * i as f64, *v)))
            .collect()
    }

    #[test]
    fn test_two_frame_gap_is_filled_linearly() {
        let mut records = sequence(&[0.9, 0.9, 0.9, 0.9, 0.9, 0.1, 0.2, 0.9, 0.9, 0.9]);
        let filled = GapInterpolator::default().fill_gaps(&mut records);
        assert_eq!(filled, 2);

        let start = 0.4;
        let end = 0.7;
        for (frame, alpha) in [(5, 1.0 / 3.0), (6, 2.0 / 3.0)] {
            let knee = records[frame].landmarks.get(LEFT_KNEE);
            assert!(knee.interpolated);
            assert_eq!(knee.visibility, 0.5);
            assert!((knee.x - (start + (end - start) * alpha)).abs() < 1e-9);
        }
        assert!(!records[4].landmarks.get(LEFT_KNEE).interpolated);
        assert!(!records[7].landmarks.get(LEFT_KNEE).interpolated);
    }

    #[test]
    fn test_run_longer_than_max_gap_is_untouched() {
        let mut records = sequence(&[0.9, 0.1, 0.1, 0.1, 0.1, 0.9]);
        let before = records.clone();
        assert_eq!(GapInterpolator::default().fill_gaps(&mut records), 0);
        assert_eq!(records, before);
    }

    #[test]
    fn test_mid_visibility_frames_count_toward_gap() {
        // Frame 1 is low; frames 2-3 are neither low nor anchors
        let mut records = sequence(&[0.9, 0.1, 0.5, 0.5, 0.9]);
        assert_eq!(GapInterpolator::default().fill_gaps(&mut records), 1);
        assert!(records[1].landmarks.get(LEFT_KNEE).interpolated);

        let mut records = sequence(&[0.9, 0.1, 0.5, 0.5, 0.5, 0.9]);
        assert_eq!(GapInterpolator::default().fill_gaps(&mut records), 0);
    }

    #[test]
    fn test_missing_anchor_at_edges() {
        let mut records = sequence(&[0.1, 0.9, 0.9, 0.1]);
        assert_eq!(GapInterpolator::default().fill_gaps(&mut records), 0);
    }

    #[test]
    fn test_undetected_frame_is_eligible() {
        let mut records = sequence(&[0.9, 0.9, 0.9]);
        records[1] = FrameRecord::undetected(1, Bucket::Severe, 21);
        let filled = GapInterpolator::default().fill_gaps(&mut records);
        assert_eq!(filled, LANDMARK_COUNT);
        assert_eq!(records[1].landmarks.interpolated_count(), LANDMARK_COUNT);
        assert!((records[1].landmarks.get(LEFT_KNEE).x - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_no_interpolation_beyond_max_gap_any_length() {
        let interpolator = GapInterpolator::default();
        for run in 0..8 {
            let mut vis = vec![0.9];
            vis.extend(std::iter::repeat(0.05).take(run));
            vis.push(0.9);
            let mut records = sequence(&vis);
            let filled = interpolator.fill_gaps(&mut records);
            if run <= 3 {
                assert_eq!(filled, run, "run {}", run);
            } else {
                assert_eq!(filled, 0, "run {}", run);
            }
        }
    }
}
