//! Job definitions and lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::stage::Stage;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted and waiting for a worker slot
    #[default]
    Pending,
    /// Owned by a worker
    Running,
    /// All stages finished
    Completed,
    /// A stage failed
    Failed,
    /// Cancelled by a caller
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// PENDING -> RUNNING -> {COMPLETED, FAILED}; CANCELLED from PENDING or RUNNING.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// A pipeline stage raised an error
    StageFailure,
    /// Failure outside any stage (worker bootstrap, detector creation)
    Internal,
}

/// Error recorded on a FAILED job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub kind: JobErrorKind,
    /// Stage that was running when the job failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Short human-readable message
    pub message: String,
}

impl JobError {
    pub fn stage_failure(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind: JobErrorKind::StageFailure,
            stage: Some(stage),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: JobErrorKind::Internal,
            stage: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{}: {}", stage, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Working paths owned by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobPaths {
    /// Directory holding every file the job produces
    pub job_dir: PathBuf,
    /// Uploaded source video
    pub input: PathBuf,
    /// Ephemeral frame batch directory
    pub frames_dir: PathBuf,
}

impl JobPaths {
    /// Standard layout under a work directory.
    pub fn under(work_dir: impl Into<PathBuf>, job_id: &JobId, input: impl Into<PathBuf>) -> Self {
        let job_dir = work_dir.into().join(job_id.as_str());
        Self {
            frames_dir: job_dir.join("frames"),
            job_dir,
            input: input.into(),
        }
    }
}

/// Artifacts referenced by a COMPLETED job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobArtifacts {
    pub trimmed_video: Option<PathBuf>,
    pub overlay_video: Option<PathBuf>,
    pub pose_data: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
    pub preview: Option<PathBuf>,
}

impl JobArtifacts {
    /// Every artifact path that is set.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        [
            &self.trimmed_video,
            &self.overlay_video,
            &self.pose_data,
            &self.thumbnail,
            &self.preview,
        ]
        .into_iter()
        .flatten()
    }
}

/// Aggregate pose statistics for a finished job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatistics {
    pub frames_processed: u64,
    pub frames_detected: u64,
    /// frames_detected / frames_processed
    pub detection_rate: f64,
    /// Mean landmark visibility over detected frames, after interpolation.
    /// Undetected frames are accounted for by `detection_rate` instead.
    pub avg_confidence: f64,
    pub interpolated_landmarks: u64,
    /// Frames per difficulty bucket
    #[serde(default)]
    pub bucket_counts: BTreeMap<String, u64>,
    /// Frames won per strategy label
    #[serde(default)]
    pub strategy_wins: BTreeMap<String, u64>,
}

/// A pose-analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub current_stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JobStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub paths: JobPaths,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<JobArtifacts>,
}

impl Job {
    /// Create a PENDING job.
    pub fn new(id: JobId, paths: JobPaths) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            finished_at: None,
            progress: 0,
            current_stage: Stage::Queued,
            statistics: None,
            error: None,
            paths,
            artifacts: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Mark the job as picked up by a worker.
    pub fn start(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Running)
    }

    /// Record progress. Regressions are ignored so reports never decrease.
    ///
    /// Returns false when the job is not running and nothing changed.
    pub fn set_progress(&mut self, progress: u8, stage: Stage) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.progress = self.progress.max(progress.min(100));
        self.current_stage = self.current_stage.max(stage);
        self.updated_at = Utc::now();
        true
    }

    /// Mark job as completed.
    pub fn complete(&mut self, artifacts: JobArtifacts, statistics: JobStatistics) -> ModelResult<()> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.current_stage = Stage::Finalize;
        self.artifacts = Some(artifacts);
        self.statistics = Some(statistics);
        Ok(())
    }

    /// Mark job as failed with an error.
    pub fn fail(&mut self, error: JobError) -> ModelResult<()> {
        self.transition(JobStatus::Failed)?;
        if let Some(stage) = error.stage {
            self.current_stage = stage;
        }
        self.error = Some(error);
        Ok(())
    }

    /// Mark job as cancelled.
    pub fn cancel(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Cancelled)
    }

    /// Time spent in a terminal state, if any.
    pub fn terminal_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| now - finished)
    }
}
