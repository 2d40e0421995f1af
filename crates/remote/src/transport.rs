//! Transport abstraction between a remote job and the service running it.

use serde::{Deserialize, Serialize};

use jobkit_core::{Args, JobError, JobId, JobResults, JobStatus, Kwargs};

/// Payload submitted to the remote service.
///
/// `args`/`kwargs` are the call arguments after delta-parameter reintegration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub command: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub kwargs: Kwargs,
}

impl RemoteRequest {
    pub fn new(command: impl Into<String>, args: Args, kwargs: Kwargs) -> Self {
        Self {
            command: command.into(),
            args,
            kwargs,
        }
    }
}

/// Remote service as seen by a [`RemoteJob`](crate::RemoteJob).
pub trait JobTransport: Send + Sync {
    /// Submit a request; the service assigns the job identifier.
    fn submit(&self, request: &RemoteRequest) -> Result<JobId, TransportError>;

    /// Current status of a submitted job.
    fn status(&self, id: JobId) -> Result<JobStatus, TransportError>;

    /// Results of a job whose status is `Success`.
    fn results(&self, id: JobId) -> Result<JobResults, TransportError>;

    /// Ask the service to cancel a job. Cancelling a finished job is not an error.
    fn cancel(&self, id: JobId) -> Result<(), TransportError>;
}

/// Transport error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("remote job not found: {0}")]
    NotFound(JobId),
    #[error("no remote handler for command: {0}")]
    UnknownCommand(String),
    #[error("results not available for job {0}")]
    NotReady(JobId),
    #[error("transport failure: {0}")]
    Io(String),
}

impl From<TransportError> for JobError {
    fn from(err: TransportError) -> Self {
        JobError::backend(err.to_string())
    }
}
