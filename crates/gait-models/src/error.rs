//! Model error types.

use thiserror::Error;

use crate::job::JobStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Invalid landmark set: {0}")]
    InvalidLandmarks(String),
}

impl ModelError {
    pub fn invalid_landmarks(msg: impl Into<String>) -> Self {
        Self::InvalidLandmarks(msg.into())
    }
}
