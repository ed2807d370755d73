//! Multi-strategy detection for a single frame.
//!
//! Strategies are generated variant-major, detector-config-minor, and keep
//! that position as their index. The winner is the highest total score over
//! the evaluated candidates; on equal scores the lower index wins.

use gait_models::{Bucket, FrameRecord, LandmarkSet, ScoreBreakdown, StrategyConfig, Variant};
use image::RgbImage;
use tracing::{debug, warn};

use crate::config::{PoseConfig, StrategyCatalog};
use crate::detector::PoseDetector;
use crate::error::{PoseError, PoseResult};
use crate::preprocess;
use crate::scorer::CandidateScorer;

/// A detection returned by one strategy, mapped back to frame coordinates.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub strategy: StrategyConfig,
    pub landmarks: LandmarkSet,
    pub score: ScoreBreakdown,
}

/// What one strategy produced for a frame. `total` is None when no person was found.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSummary {
    pub index: usize,
    pub label: String,
    pub total: Option<f64>,
}

/// Outcome of strategy selection for one frame.
#[derive(Debug, Clone)]
pub struct FrameSelection {
    pub record: FrameRecord,
    pub evaluated: Vec<CandidateSummary>,
}

impl FrameSelection {
    pub fn attempted(&self) -> usize {
        self.evaluated.len()
    }
}

pub struct MultiStrategyInvoker {
    catalog: StrategyCatalog,
    scorer: CandidateScorer,
    excellent_score: f64,
}

impl MultiStrategyInvoker {
    pub fn new(config: &PoseConfig) -> Self {
        Self {
            catalog: config.strategies.clone(),
            scorer: CandidateScorer::new(config.scoring.clone()),
            excellent_score: config.excellent_score,
        }
    }

    /// Strategies for `bucket`, in evaluation order.
    pub fn plan(&self, bucket: Bucket) -> Vec<StrategyConfig> {
        let plan = self.catalog.plan(bucket);
        plan.variants
            .iter()
            .flat_map(|variant| plan.detectors.iter().map(move |detector| (*variant, detector)))
            .enumerate()
            .map(|(index, (variant, detector))| StrategyConfig {
                index,
                variant,
                detector: detector.clone(),
            })
            .collect()
    }

    /// Run the bucket's strategies against `frame` and keep the best candidate.
    ///
    /// A detector reporting [`PoseError::DetectionFailed`] costs only that
    /// strategy; any other detector error aborts the frame.
    pub async fn select(
        &self,
        detector: &mut dyn PoseDetector,
        frame_index: usize,
        bucket: Bucket,
        frame: &RgbImage,
        previous: Option<&LandmarkSet>,
    ) -> PoseResult<FrameSelection> {
        let mut best: Option<Candidate> = None;
        let mut evaluated = Vec::new();

        for strategy in self.plan(bucket) {
            let candidate = self.evaluate(detector, &strategy, frame, previous).await;
            let candidate = match candidate {
                Ok(candidate) => candidate,
                Err(PoseError::DetectionFailed(msg)) => {
                    warn!(
                        frame = frame_index,
                        strategy = %strategy.label(),
                        error = %msg,
                        "Strategy failed, skipping"
                    );
                    None
                }
                Err(e) => return Err(e),
            };

            evaluated.push(CandidateSummary {
                index: strategy.index,
                label: strategy.label(),
                total: candidate.as_ref().map(|c| c.score.total),
            });

            let Some(candidate) = candidate else {
                continue;
            };

            let excellent = candidate.score.total >= self.excellent_score;
            let improves = best
                .as_ref()
                .map_or(true, |b| candidate.score.total > b.score.total);
            if improves {
                best = Some(candidate);
            }
            if excellent {
                break;
            }
        }

        let attempted = evaluated.len();
        let record = match best {
            Some(winner) => {
                debug!(
                    frame = frame_index,
                    bucket = %bucket,
                    strategy = %winner.strategy.label(),
                    score = winner.score.total,
                    attempted,
                    "Frame selected"
                );
                FrameRecord {
                    index: frame_index,
                    bucket,
                    strategy: Some(winner.strategy.label()),
                    score: Some(winner.score),
                    candidates_evaluated: attempted,
                    landmarks: winner.landmarks,
                }
            }
            None => {
                debug!(frame = frame_index, bucket = %bucket, attempted, "No person detected");
                FrameRecord::undetected(frame_index, bucket, attempted)
            }
        };

        Ok(FrameSelection { record, evaluated })
    }

    async fn evaluate(
        &self,
        detector: &mut dyn PoseDetector,
        strategy: &StrategyConfig,
        frame: &RgbImage,
        previous: Option<&LandmarkSet>,
    ) -> PoseResult<Option<Candidate>> {
        let processed;
        let image = if strategy.variant == Variant::Identity {
            frame
        } else {
            processed = preprocess::apply(strategy.variant, frame);
            &processed
        };

        let Some(landmarks) = detector.detect(image, &strategy.detector).await? else {
            return Ok(None);
        };
        let landmarks = if strategy.variant.is_mirrored() {
            landmarks.unmirrored()
        } else {
            landmarks
        };

        let score = self.scorer.score(&landmarks, previous);
        Ok(Some(Candidate {
            strategy: strategy.clone(),
            landmarks,
            score,
        }))
    }
}
