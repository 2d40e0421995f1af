//! Job status: the value backends publish and the core reads.
//!
//! ```text
//!   Waiting ──start_run()──→ Running ──succeed()──→ Success
//!      │                        │
//!      │                        ├──fail(msg)──→ Error
//!      │                        │
//!      └────────────────────────┴──cancel()───→ Cancelled
//! ```
//!
//! Terminal states are permanent. `stop_message` is only ever set for `Error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

/// Lifecycle state of a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningStatus {
    /// Created (or submitted) but not running yet.
    Waiting,
    Running,
    Success,
    Error,
    Cancelled,
}

impl RunningStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunningStatus::Success | RunningStatus::Error | RunningStatus::Cancelled
        )
    }
}

impl core::fmt::Display for RunningStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RunningStatus::Waiting => "WAITING",
            RunningStatus::Running => "RUNNING",
            RunningStatus::Success => "SUCCESS",
            RunningStatus::Error => "ERROR",
            RunningStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Snapshot of a job's execution status.
///
/// Fields are private so that `completed() == state().is_terminal()` and the
/// stop-message rule hold for every value built through the transition methods.
/// Deserialized values are checked against the same rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawJobStatus")]
pub struct JobStatus {
    state: RunningStatus,
    stop_message: Option<String>,
    /// Progress in \[0, 1\], reported by the backend while running.
    progress: f64,
    progress_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
}

/// Unchecked wire form of [`JobStatus`].
#[derive(Deserialize)]
struct RawJobStatus {
    state: RunningStatus,
    #[serde(default)]
    stop_message: Option<String>,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    progress_message: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    stopped_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawJobStatus> for JobStatus {
    type Error = JobError;

    fn try_from(raw: RawJobStatus) -> Result<Self, Self::Error> {
        match (raw.state, &raw.stop_message) {
            (RunningStatus::Error, None) => {
                return Err(JobError::InvalidStatus(
                    "an ERROR status must carry a stop message".to_string(),
                ));
            }
            (state, Some(_)) if state != RunningStatus::Error => {
                return Err(JobError::InvalidStatus(format!(
                    "a {state} status cannot carry a stop message"
                )));
            }
            _ => {}
        }
        if !(0.0..=1.0).contains(&raw.progress) {
            return Err(JobError::InvalidStatus(format!(
                "progress {} is outside [0, 1]",
                raw.progress
            )));
        }
        if raw.stopped_at.is_some() && !raw.state.is_terminal() {
            return Err(JobError::InvalidStatus(format!(
                "a {} status cannot have a stop time",
                raw.state
            )));
        }

        Ok(Self {
            state: raw.state,
            stop_message: raw.stop_message,
            progress: raw.progress,
            progress_message: raw.progress_message,
            started_at: raw.started_at,
            stopped_at: raw.stopped_at,
        })
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStatus {
    /// A fresh status in the `Waiting` state.
    pub fn new() -> Self {
        Self {
            state: RunningStatus::Waiting,
            stop_message: None,
            progress: 0.0,
            progress_message: None,
            started_at: None,
            stopped_at: None,
        }
    }

    pub fn state(&self) -> RunningStatus {
        self.state
    }

    pub fn completed(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn stop_message(&self) -> Option<&str> {
        self.stop_message.as_deref()
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn progress_message(&self) -> Option<&str> {
        self.progress_message.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    /// Time spent running: up to now while running, up to the stop time once terminal.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let started = self.started_at?;
        let end = self.stopped_at.unwrap_or_else(Utc::now);
        Some(end - started)
    }

    /// `Waiting -> Running`.
    pub fn start_run(&mut self) -> JobResult<()> {
        if self.state != RunningStatus::Waiting {
            return Err(self.invalid(RunningStatus::Running));
        }
        self.state = RunningStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Record progress while running. Values are clamped to \[0, 1\].
    pub fn update_progress(&mut self, progress: f64, message: Option<String>) -> JobResult<()> {
        if self.state != RunningStatus::Running {
            return Err(self.invalid(RunningStatus::Running));
        }
        self.progress = if progress.is_nan() {
            self.progress
        } else {
            progress.clamp(0.0, 1.0)
        };
        if message.is_some() {
            self.progress_message = message;
        }
        Ok(())
    }

    /// `Running -> Success`.
    pub fn succeed(&mut self) -> JobResult<()> {
        if self.state != RunningStatus::Running {
            return Err(self.invalid(RunningStatus::Success));
        }
        self.progress = 1.0;
        self.stop(RunningStatus::Success, None);
        Ok(())
    }

    /// Any non-terminal state `-> Error`, carrying the backend's stop message.
    pub fn fail(&mut self, message: impl Into<String>) -> JobResult<()> {
        if self.completed() {
            return Err(self.invalid(RunningStatus::Error));
        }
        self.stop(RunningStatus::Error, Some(message.into()));
        Ok(())
    }

    /// Any non-terminal state `-> Cancelled`.
    pub fn cancel(&mut self) -> JobResult<()> {
        if self.completed() {
            return Err(self.invalid(RunningStatus::Cancelled));
        }
        self.stop(RunningStatus::Cancelled, None);
        Ok(())
    }

    fn stop(&mut self, state: RunningStatus, stop_message: Option<String>) {
        let now = Utc::now();
        self.started_at.get_or_insert(now);
        self.stopped_at = Some(now);
        self.state = state;
        self.stop_message = stop_message;
    }

    fn invalid(&self, to: RunningStatus) -> JobError {
        JobError::InvalidTransition {
            from: self.state,
            to,
        }
    }
}
