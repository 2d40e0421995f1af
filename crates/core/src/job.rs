//! The job contract and the state every backend embeds.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{JobError, JobResult};
use crate::id::JobId;
use crate::params::{Args, DeltaParameters, DeltaValue, Kwargs};
use crate::results::JobResults;
use crate::status::{JobStatus, RunningStatus};

/// Post-processing step applied to raw results on successful retrieval.
///
/// Receives the raw `results` value and the captured delta parameters as keyword
/// arguments. Must be pure: retrieval relies on it being deterministic.
pub type ResultMapping = Arc<dyn Fn(JsonValue, &Kwargs) -> Result<JsonValue, String> + Send + Sync>;

/// Everything needed to build a job.
///
/// `W` is the backend's unit of work: a callable for local execution, a command
/// name for remote execution.
pub struct JobConfig<W> {
    pub work: W,
    pub result_mapping: Option<ResultMapping>,
    pub delta_parameters: DeltaParameters,
}

impl<W> JobConfig<W> {
    pub fn new(work: W) -> Self {
        Self {
            work,
            result_mapping: None,
            delta_parameters: DeltaParameters::new(),
        }
    }

    pub fn with_result_mapping<F>(mut self, mapping: F) -> Self
    where
        F: Fn(JsonValue, &Kwargs) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        self.result_mapping = Some(Arc::new(mapping));
        self
    }

    pub fn with_delta_parameters(mut self, delta_parameters: DeltaParameters) -> Self {
        self.delta_parameters = delta_parameters;
        self
    }

    /// Capture `name` from the call site when the job is executed.
    pub fn defer(mut self, name: impl Into<String>) -> Self {
        self.delta_parameters.insert(name, DeltaValue::Pending);
        self
    }

    /// Pin `name` to `value`; it is injected into the call's keyword arguments.
    pub fn fix(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.delta_parameters.insert(name, DeltaValue::Fixed(value));
        self
    }

    /// Split into the unit of work and the shared job state.
    pub fn into_parts(self) -> (W, JobCore) {
        let core = JobCore {
            result_mapping: self.result_mapping,
            state: Mutex::new(CoreState {
                id: None,
                delta: self.delta_parameters,
                delta_generation: 0,
                status: JobStatus::new(),
                raw: None,
                mapped: false,
                cancel_requested: false,
            }),
        };
        (self.work, core)
    }
}

impl<W: core::fmt::Debug> core::fmt::Debug for JobConfig<W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobConfig")
            .field("work", &self.work)
            .field("result_mapping", &self.result_mapping.is_some())
            .field("delta_parameters", &self.delta_parameters)
            .finish()
    }
}

/// Shared job state: identifier, delta parameters, status and raw results.
///
/// Status and raw results sit behind one lock and are published together, so a
/// reader never sees a completed status without the matching result.
pub struct JobCore {
    result_mapping: Option<ResultMapping>,
    state: Mutex<CoreState>,
}

struct CoreState {
    id: Option<JobId>,
    delta: DeltaParameters,
    delta_generation: u64,
    status: JobStatus,
    raw: Option<JobResults>,
    /// Set once the mapping function has been applied to `raw`.
    mapped: bool,
    cancel_requested: bool,
}

/// What [`JobCore::request_cancel`] did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started and is now `Cancelled`.
    Cancelled,
    /// The job is running. The request is recorded and the job will end `Cancelled`
    /// unless its backend reports another terminal state first.
    Requested,
    /// The job had already reached a terminal state.
    Finished,
}

impl JobCore {
    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Option<JobId> {
        self.lock().id
    }

    /// Assign the identifier. Identifiers are immutable once set.
    pub fn assign_id(&self, id: JobId) -> JobResult<()> {
        let mut state = self.lock();
        if state.id.is_some() {
            return Err(JobError::IdAlreadyAssigned);
        }
        state.id = Some(id);
        Ok(())
    }

    /// Current delta map (captured values after execution).
    pub fn delta_parameters(&self) -> DeltaParameters {
        self.lock().delta.clone()
    }

    /// Number of times the delta map has been replaced.
    pub fn delta_generation(&self) -> u64 {
        self.lock().delta_generation
    }

    /// Reintegrate delta parameters into the call arguments and swap in the new map.
    ///
    /// On error the stored map is left as it was.
    pub fn adapt_parameters(&self, args: Args, kwargs: Kwargs) -> JobResult<(Args, Kwargs)> {
        let mut state = self.lock();
        let out = state.delta.reintegrate(args, kwargs)?;
        state.delta = out.delta;
        state.delta_generation += 1;
        debug!(
            job_id = ?state.id,
            generation = state.delta_generation,
            captured = state.delta.len(),
            "delta parameters reintegrated"
        );
        Ok((out.args, out.kwargs))
    }

    /// Snapshot of the stored status.
    pub fn status(&self) -> JobStatus {
        self.lock().status.clone()
    }

    /// Reintegrate the call arguments and move to `Running`, atomically.
    ///
    /// Fails with `AlreadyStarted` (delta untouched) if the job left `Waiting`, and
    /// with `InsufficientArguments` (status untouched) if reintegration fails.
    pub fn start(&self, args: Args, kwargs: Kwargs) -> JobResult<(Args, Kwargs)> {
        let mut state = self.lock();
        if state.status.state() != RunningStatus::Waiting {
            return Err(JobError::AlreadyStarted);
        }
        let out = state.delta.reintegrate(args, kwargs)?;
        state.status.start_run()?;
        state.delta = out.delta;
        state.delta_generation += 1;
        debug!(
            job_id = ?state.id,
            generation = state.delta_generation,
            captured = state.delta.len(),
            "job started"
        );
        Ok((out.args, out.kwargs))
    }

    /// Claim the job for execution: `Waiting -> Running`.
    pub fn begin(&self) -> JobResult<()> {
        let mut state = self.lock();
        if state.status.state() != RunningStatus::Waiting {
            return Err(JobError::AlreadyStarted);
        }
        state.status.start_run()
    }

    /// Cancel a waiting job, or record a cancellation request for a running one.
    pub fn request_cancel(&self) -> CancelOutcome {
        let mut state = self.lock();
        match state.status.state() {
            RunningStatus::Waiting => match state.status.cancel() {
                Ok(()) => {
                    debug!(job_id = ?state.id, "job cancelled before start");
                    CancelOutcome::Cancelled
                }
                Err(_) => CancelOutcome::Finished,
            },
            RunningStatus::Running => {
                state.cancel_requested = true;
                CancelOutcome::Requested
            }
            _ => CancelOutcome::Finished,
        }
    }

    /// Consume a pending cancellation request. Returns `true` at most once per request.
    pub fn take_cancel_request(&self) -> bool {
        std::mem::take(&mut self.lock().cancel_requested)
    }

    /// Publish the outcome of a run, raw results and status in one step, honouring a
    /// cancellation requested meanwhile.
    ///
    /// The request is checked under the same lock the outcome is published with, so a
    /// [`request_cancel`](Self::request_cancel) that returned `Requested` always wins.
    pub fn publish_outcome(&self, outcome: Result<JobResults, String>) -> JobResult<RunningStatus> {
        let mut state = self.lock();
        if state.cancel_requested {
            state.status.cancel()?;
            debug!(job_id = ?state.id, "job cancelled, outcome discarded");
            return Ok(RunningStatus::Cancelled);
        }
        match outcome {
            Ok(results) => {
                state.status.succeed()?;
                state.raw = Some(results);
                state.mapped = false;
                debug!(job_id = ?state.id, "job succeeded");
                Ok(RunningStatus::Success)
            }
            Err(message) => {
                debug!(job_id = ?state.id, error = %message, "job failed");
                state.status.fail(message)?;
                Ok(RunningStatus::Error)
            }
        }
    }

    pub fn publish_failure(&self, message: impl Into<String>) -> JobResult<()> {
        let mut state = self.lock();
        let message = message.into();
        state.status.fail(message.clone())?;
        debug!(job_id = ?state.id, error = %message, "job failed");
        Ok(())
    }

    /// Replace the stored status with a snapshot reported by a backend.
    ///
    /// A stored terminal status is never overwritten, and a `Waiting` snapshot does not
    /// move a running job back (a queued remote job still counts as started). A
    /// `Success` snapshot must come with its results.
    pub fn publish_status(&self, status: JobStatus, results: Option<JobResults>) -> JobResult<()> {
        let mut state = self.lock();
        if state.status.completed() {
            return Ok(());
        }
        if state.status.state() == RunningStatus::Running && status.state() == RunningStatus::Waiting {
            return Ok(());
        }
        if status.state() == RunningStatus::Success {
            let results = results
                .ok_or_else(|| JobError::backend("success reported without results"))?;
            state.raw = Some(results);
            state.mapped = false;
        }
        state.status = status;
        Ok(())
    }

    /// Raw results with the mapping function applied.
    ///
    /// The mapping runs at most once; later calls return the cached mapped container.
    /// A mapping error leaves the raw results untouched.
    fn mapped_results(&self) -> JobResult<JobResults> {
        let mut state = self.lock();
        let state = &mut *state;
        let raw = state
            .raw
            .as_mut()
            .ok_or_else(|| JobError::backend("job completed without publishing results"))?;

        if let Some(mapping) = &self.result_mapping {
            if !state.mapped {
                let kwargs = state.delta.as_kwargs();
                raw.results = mapping(raw.results.clone(), &kwargs).map_err(JobError::Mapping)?;
                state.mapped = true;
            }
        }

        Ok(raw.clone())
    }
}

impl core::fmt::Debug for JobCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.lock();
        f.debug_struct("JobCore")
            .field("id", &state.id)
            .field("status", &state.status.state())
            .field("delta", &state.delta)
            .field("result_mapping", &self.result_mapping.is_some())
            .finish()
    }
}

/// A handle to deferred computation with queryable status and retrievable results.
///
/// Backends implement execution and status; retrieval is shared.
pub trait Job: Send + Sync {
    fn core(&self) -> &JobCore;

    /// Current status. Must not change completion state or results.
    fn status(&self) -> JobStatus;

    /// Run to completion and return the (mapped) results.
    fn execute_sync(&self, args: Args, kwargs: Kwargs) -> JobResult<JobResults>;

    /// Start execution without waiting for it.
    fn execute_async(&self, args: Args, kwargs: Kwargs) -> JobResult<()>;

    fn id(&self) -> Option<JobId> {
        self.core().id()
    }

    fn is_completed(&self) -> bool {
        self.status().completed()
    }

    /// Calling a job runs it synchronously.
    fn call(&self, args: Args, kwargs: Kwargs) -> JobResult<JobResults> {
        self.execute_sync(args, kwargs)
    }

    /// Results of a finished job.
    ///
    /// Fails with `NotCompleted` while the job is not terminal and with
    /// `ExecutionFailed` if it ended in `Error` or `Cancelled`.
    fn get_results(&self) -> JobResult<JobResults> {
        let status = self.status();
        if !status.completed() {
            return Err(JobError::NotCompleted);
        }
        match status.state() {
            RunningStatus::Success => self.core().mapped_results(),
            RunningStatus::Cancelled => Err(JobError::execution_failed(
                RunningStatus::Cancelled,
                "job was cancelled",
            )),
            state => {
                let message = status.stop_message().unwrap_or("job failed without a stop message");
                Err(JobError::execution_failed(state, message))
            }
        }
    }
}
