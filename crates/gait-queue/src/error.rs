//! Queue error types.

use std::fmt;

use gait_models::{JobId, JobStatus, ModelError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

/// Why a submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// The pending queue is at capacity
    QueueFull,
    /// Process memory stayed above the reject threshold after relief
    MemoryPressure,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::QueueFull => "queue_full",
            RejectReason::MemoryPressure => "memory_pressure",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Admission rejected: {reason}")]
    AdmissionRejected { reason: RejectReason },

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {job_id} is {status} and cannot be cancelled")]
    NotCancellable { job_id: JobId, status: JobStatus },

    #[error(transparent)]
    InvalidTransition(#[from] ModelError),
}

impl QueueError {
    pub fn rejected(reason: RejectReason) -> Self {
        Self::AdmissionRejected { reason }
    }

    /// The rejection reason, if this is an admission rejection.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::AdmissionRejected { reason } => Some(*reason),
            _ => None,
        }
    }
}
