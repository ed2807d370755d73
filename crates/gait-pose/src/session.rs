//! Per-job pose extraction session.
//!
//! Owns the job's detector lease and the running frame sequence. Frames are
//! fed in order, batch by batch; [`PoseSession::finish`] runs the gap
//! interpolation post-pass and releases the detector.

use std::collections::BTreeMap;

use gait_models::{Bucket, FrameRecord, JobStatistics, LandmarkSet};
use image::RgbImage;

use crate::categorizer::{build_classifier, FrameClassifier};
use crate::config::PoseConfig;
use crate::detector::DetectorLease;
use crate::error::PoseResult;
use crate::interpolate::GapInterpolator;
use crate::invoker::MultiStrategyInvoker;

/// Number of previously chosen frames visible to the classifier.
const HISTORY_LEN: usize = 2;

pub struct PoseSession {
    lease: DetectorLease,
    classifier: Box<dyn FrameClassifier>,
    invoker: MultiStrategyInvoker,
    interpolator: GapInterpolator,
    history: Vec<LandmarkSet>,
    records: Vec<FrameRecord>,
    strategies_attempted: BTreeMap<Bucket, u64>,
}

impl PoseSession {
    pub fn new(lease: DetectorLease, config: &PoseConfig) -> Self {
        Self {
            lease,
            classifier: build_classifier(&config.categorizer),
            invoker: MultiStrategyInvoker::new(config),
            interpolator: GapInterpolator::new(config.interpolation.clone()),
            history: Vec::with_capacity(HISTORY_LEN),
            records: Vec::new(),
            strategies_attempted: BTreeMap::new(),
        }
    }

    /// Replace the default classifier.
    pub fn with_classifier(mut self, classifier: Box<dyn FrameClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Classify, detect and select the landmarks for the next frame.
    pub async fn process_frame(&mut self, frame_index: usize, frame: &RgbImage) -> PoseResult<&FrameRecord> {
        let bucket = self.classifier.classify(frame_index, frame, &self.history);
        let selection = self
            .invoker
            .select(&mut *self.lease, frame_index, bucket, frame, self.history.last())
            .await?;

        *self.strategies_attempted.entry(bucket).or_default() += selection.attempted() as u64;

        if self.history.len() == HISTORY_LEN {
            self.history.remove(0);
        }
        self.history.push(selection.record.landmarks.clone());
        self.records.push(selection.record);

        Ok(&self.records[self.records.len() - 1])
    }

    pub fn frames_processed(&self) -> usize {
        self.records.len()
    }

    /// Interpolate gaps over the whole sequence and release the detector.
    pub fn finish(self) -> SessionOutput {
        let Self {
            lease,
            interpolator,
            mut records,
            strategies_attempted,
            ..
        } = self;
        drop(lease);

        let interpolated_landmarks = interpolator.fill_gaps(&mut records);
        SessionOutput {
            records,
            interpolated_landmarks,
            strategies_attempted,
        }
    }
}

/// Finished, interpolated frame sequence for one job.
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub records: Vec<FrameRecord>,
    pub interpolated_landmarks: usize,
    /// Strategies attempted per bucket
    pub strategies_attempted: BTreeMap<Bucket, u64>,
}

impl SessionOutput {
    pub fn statistics(&self) -> JobStatistics {
        let frames_processed = self.records.len() as u64;
        let detected: Vec<&FrameRecord> = self
            .records
            .iter()
            .filter(|r| r.landmarks.is_detected())
            .collect();
        let frames_detected = detected.len() as u64;

        let detection_rate = if frames_processed == 0 {
            0.0
        } else {
            frames_detected as f64 / frames_processed as f64
        };
        let avg_confidence = if detected.is_empty() {
            0.0
        } else {
            detected.iter().map(|r| r.landmarks.mean_visibility()).sum::<f64>() / detected.len() as f64
        };

        let mut bucket_counts = BTreeMap::new();
        let mut strategy_wins = BTreeMap::new();
        for record in &self.records {
            *bucket_counts.entry(record.bucket.as_str().to_string()).or_insert(0) += 1;
            if let Some(label) = &record.strategy {
                *strategy_wins.entry(label.clone()).or_insert(0) += 1;
            }
        }

        JobStatistics {
            frames_processed,
            frames_detected,
            detection_rate,
            avg_confidence,
            interpolated_landmarks: self.interpolated_landmarks as u64,
            bucket_counts,
            strategy_wins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectorFactory, PoseDetector};
    use async_trait::async_trait;
    use gait_models::landmark_ids::LEFT_KNEE;
    use gait_models::{DetectorConfig, JobId, Landmark, LANDMARK_COUNT};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Returns visibility 0.9 everywhere except the left knee on chosen frames.
    struct KneeDropDetector {
        frame: usize,
        low_frames: Vec<usize>,
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PoseDetector for KneeDropDetector {
        async fn detect(
            &mut self,
            image: &RgbImage,
            _config: &DetectorConfig,
        ) -> PoseResult<Option<LandmarkSet>> {
            // Frame index is encoded in the red channel of pixel (0, 0)
            self.frame = image.get_pixel(0, 0)[0] as usize;
            let knee_visibility = if self.low_frames.contains(&self.frame) { 0.1 } else { 0.9 };
            let lms = (0..LANDMARK_COUNT)
                .map(|id| {
                    let v = if id == LEFT_KNEE { knee_visibility } else { 0.9 };
                    Landmark::new(id as u8, 0.5, 0.5 + self.frame as f64 * 0.01, 0.0, v)
                })
                .collect();
            Ok(Some(LandmarkSet::new(lms)?))
        }

        fn name(&self) -> &'static str {
            "knee-drop"
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct Factory {
        low_frames: Vec<usize>,
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl DetectorFactory for Factory {
        async fn create(&self, _job_id: &JobId) -> PoseResult<Box<dyn PoseDetector>> {
            Ok(Box::new(KneeDropDetector {
                frame: 0,
                low_frames: self.low_frames.clone(),
                released: Arc::clone(&self.released),
            }))
        }
    }

    fn frame(index: usize) -> RgbImage {
        let mut img = RgbImage::new(8, 8);
        img.get_pixel_mut(0, 0)[0] = index as u8;
        img
    }

    async fn run(low_frames: Vec<usize>, frames: usize) -> (SessionOutput, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let factory = Factory {
            low_frames,
            released: Arc::clone(&released),
        };
        let lease = DetectorLease::acquire(&factory, &JobId::new()).await.unwrap();
        let mut session = PoseSession::new(lease, &PoseConfig::default());
        for i in 0..frames {
            session.process_frame(i, &frame(i)).await.unwrap();
        }
        assert!(!released.load(Ordering::SeqCst));
        (session.finish(), released)
    }

    #[tokio::test]
    async fn test_clean_clip_statistics() {
        let (output, released) = run(vec![], 10).await;
        assert!(released.load(Ordering::SeqCst));

        let stats = output.statistics();
        assert_eq!(stats.frames_processed, 10);
        assert_eq!(stats.frames_detected, 10);
        assert_eq!(stats.interpolated_landmarks, 0);
        assert!((stats.avg_confidence - 0.9).abs() < 1e-9);
        assert_eq!(stats.bucket_counts.get("good"), Some(&10));
        assert_eq!(stats.strategy_wins.get("identity/tracking"), Some(&10));
        assert_eq!(output.strategies_attempted.get(&Bucket::Good), Some(&10));
    }

    #[tokio::test]
    async fn test_avg_confidence_covers_detected_frames_only() {
        let (mut output, _) = run(vec![], 2).await;
        output.records.push(FrameRecord::undetected(2, Bucket::Severe, 21));
        output.records.push(FrameRecord::undetected(3, Bucket::Severe, 21));

        let stats = output.statistics();
        assert_eq!(stats.frames_processed, 4);
        assert_eq!(stats.frames_detected, 2);
        assert!((stats.detection_rate - 0.5).abs() < 1e-9);
        assert!((stats.avg_confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_short_knee_gap_is_interpolated() {
        let (output, _) = run(vec![5, 6], 10).await;
        assert_eq!(output.interpolated_landmarks, 2);

        let start = output.records[4].landmarks.get(LEFT_KNEE).y;
        let end = output.records[7].landmarks.get(LEFT_KNEE).y;
        for (frame, alpha) in [(5, 1.0 / 3.0), (6, 2.0 / 3.0)] {
            let knee = output.records[frame].landmarks.get(LEFT_KNEE);
            assert!(knee.interpolated);
            assert!((knee.y - (start + (end - start) * alpha)).abs() < 1e-9);
        }
    }
}
