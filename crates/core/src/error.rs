//! Job error model.

use std::time::Duration;

use thiserror::Error;

use crate::status::RunningStatus;

/// Result type used across the job layer.
pub type JobResult<T> = Result<T, JobError>;

/// Job-level error.
///
/// The core never retries and never recovers silently: every variant is handed
/// straight back to the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JobError {
    /// Results were requested before the job reached a terminal state.
    #[error("the job is still running, results are not available yet")]
    NotCompleted,

    /// The job reached a terminal state other than success.
    #[error("the job failed ({state}): {message}")]
    ExecutionFailed { state: RunningStatus, message: String },

    /// Not enough positional arguments to fill every pending delta parameter.
    #[error("insufficient positional arguments: no value left for parameter `{parameter}`")]
    InsufficientArguments { parameter: String },

    /// The result mapping function rejected the raw results.
    #[error("result mapping failed: {0}")]
    Mapping(String),

    /// The job was already submitted for execution.
    #[error("the job has already been started")]
    AlreadyStarted,

    /// A status transition that the state machine does not allow.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: RunningStatus, to: RunningStatus },

    /// A status value breaks the status rules (e.g. received from a backend).
    #[error("invalid job status: {0}")]
    InvalidStatus(String),

    /// An identifier was already assigned to this job.
    #[error("job identifier already assigned")]
    IdAlreadyAssigned,

    /// A backend (thread, transport) failed outside of the job itself.
    #[error("backend error: {0}")]
    Backend(String),

    /// A backend gave up waiting for a terminal state.
    #[error("timed out after {0:?} waiting for the job to complete")]
    Timeout(Duration),
}

impl JobError {
    pub fn execution_failed(state: RunningStatus, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            state,
            message: message.into(),
        }
    }

    pub fn insufficient_arguments(parameter: impl Into<String>) -> Self {
        Self::InsufficientArguments {
            parameter: parameter.into(),
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
