//! In-process job execution.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use jobkit_core::{
    Args, CancelOutcome, Job, JobConfig, JobCore, JobError, JobResult, JobResults, JobStatus,
    Kwargs,
};

use crate::config::LocalJobConfig;

/// Callable run by a local job. An `Err` becomes the job's stop message.
pub type JobFn = Arc<dyn Fn(Args, Kwargs) -> Result<JsonValue, String> + Send + Sync>;

/// Job that runs its callable in the current process.
pub struct LocalJob {
    callable: JobFn,
    core: Arc<JobCore>,
    config: LocalJobConfig,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl LocalJob {
    pub fn new<F>(config: JobConfig<F>) -> Self
    where
        F: Fn(Args, Kwargs) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        Self::with_config(config, LocalJobConfig::default())
    }

    pub fn with_config<F>(config: JobConfig<F>, local: LocalJobConfig) -> Self
    where
        F: Fn(Args, Kwargs) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        let (callable, core) = config.into_parts();
        Self {
            callable: Arc::new(callable),
            core: Arc::new(core),
            config: local,
            worker: Mutex::new(None),
        }
    }

    /// Shorthand for a job with no mapping and no delta parameters.
    pub fn from_fn<F>(callable: F) -> Self
    where
        F: Fn(Args, Kwargs) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        Self::new(JobConfig::new(callable))
    }

    /// Cancel the job.
    ///
    /// A job that has not started is cancelled immediately. A running job keeps
    /// running, but its outcome is discarded. Returns `true` iff the job ends as
    /// `Cancelled`, `false` if it had already finished.
    pub fn cancel(&self) -> bool {
        match self.core.request_cancel() {
            CancelOutcome::Cancelled => {
                info!("local job cancelled before start");
                true
            }
            CancelOutcome::Requested => {
                info!("local job cancellation requested");
                true
            }
            CancelOutcome::Finished => false,
        }
    }

    /// Block until the background thread (if any) exits and return the final status.
    pub fn wait(&self) -> JobStatus {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(thread = %self.config.thread_name, "local job worker panicked");
            }
        }
        self.core.status()
    }
}

impl Job for LocalJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn status(&self) -> JobStatus {
        self.core.status()
    }

    fn execute_sync(&self, args: Args, kwargs: Kwargs) -> JobResult<JobResults> {
        let (args, kwargs) = self.core.start(args, kwargs)?;
        info!(mode = "sync", "local job started");
        run_to_completion(&self.callable, &self.core, args, kwargs);
        self.get_results()
    }

    fn execute_async(&self, args: Args, kwargs: Kwargs) -> JobResult<()> {
        let (args, kwargs) = self.core.start(args, kwargs)?;

        let callable = self.callable.clone();
        let core = self.core.clone();

        let mut builder = thread::Builder::new().name(self.config.thread_name.clone());
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }

        let handle = builder
            .spawn(move || run_to_completion(&callable, &core, args, kwargs))
            .map_err(|e| {
                let error = format!("failed to spawn local job thread: {e}");
                self.core.publish_failure(error.clone()).ok();
                JobError::backend(error)
            })?;

        info!(mode = "async", thread = %self.config.thread_name, "local job started");
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }
}

fn run_to_completion(callable: &JobFn, core: &JobCore, args: Args, kwargs: Kwargs) {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| callable(args, kwargs))) {
        Ok(Ok(value)) => Ok(JobResults::new(value)),
        Ok(Err(error)) => {
            warn!(error = %error, "local job failed");
            Err(error)
        }
        Err(payload) => {
            let error = panic_message(payload.as_ref());
            warn!(error = %error, "local job panicked");
            Err(error)
        }
    };

    match core.publish_outcome(outcome) {
        Ok(state) => debug!(status = %state, "local job finished"),
        Err(e) => {
            debug!(error = %e, status = %core.status().state(), "local job outcome not published")
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobkit_core::RunningStatus;
    use serde_json::json;

    fn sum_args(args: Args, _kwargs: Kwargs) -> Result<JsonValue, String> {
        Ok(json!(args.iter().filter_map(JsonValue::as_i64).sum::<i64>()))
    }

    #[test]
    fn execute_sync_returns_callable_output() {
        let job = LocalJob::from_fn(sum_args);

        let results = job.execute_sync(vec![json!(1), json!(2)], Kwargs::new()).unwrap();

        assert_eq!(results.results, json!(3));
        assert!(job.is_completed());
        assert!(job.id().is_none());
    }

    #[test]
    fn call_is_execute_sync() {
        let job = LocalJob::from_fn(sum_args);

        let results = job.call(vec![json!(4), json!(5)], Kwargs::new()).unwrap();

        assert_eq!(results.results, json!(9));
    }

    #[test]
    fn callable_error_becomes_stop_message() {
        let job = LocalJob::from_fn(|_args, _kwargs| Err("no photons detected".to_string()));

        let err = job.execute_sync(vec![], Kwargs::new()).unwrap_err();

        assert_eq!(
            err,
            JobError::execution_failed(RunningStatus::Error, "no photons detected")
        );
        assert_eq!(job.status().stop_message(), Some("no photons detected"));
    }

    #[test]
    fn panic_in_callable_is_reported_as_error() {
        let job = LocalJob::from_fn(|_args, _kwargs| -> Result<JsonValue, String> {
            panic!("boom")
        });

        let err = job.execute_sync(vec![], Kwargs::new()).unwrap_err();

        match err {
            JobError::ExecutionFailed { state, message } => {
                assert_eq!(state, RunningStatus::Error);
                assert_eq!(message, "panicked: boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn delta_parameters_reach_callable_and_mapping() {
        let job = LocalJob::new(
            JobConfig::new(|args: Args, kwargs: Kwargs| -> Result<JsonValue, String> {
                let n = args.len() as i64;
                let offset = kwargs.get("offset").and_then(JsonValue::as_i64).unwrap_or(0);
                Ok(json!(n + offset))
            })
            .defer("label")
            .fix("offset", json!(100))
            .with_result_mapping(|results, params| {
                Ok(json!({ "value": results, "label": params.get("label").cloned() }))
            }),
        );

        let results = job
            .execute_sync(vec![json!("run-1"), json!(1), json!(2)], Kwargs::new())
            .unwrap();

        assert_eq!(results.results, json!({"value": 102, "label": "run-1"}));
    }

    #[test]
    fn cannot_execute_twice() {
        let job = LocalJob::from_fn(sum_args);
        job.execute_sync(vec![], Kwargs::new()).unwrap();

        assert_eq!(
            job.execute_sync(vec![], Kwargs::new()).unwrap_err(),
            JobError::AlreadyStarted
        );
    }

    #[test]
    fn insufficient_arguments_do_not_start_the_job() {
        let job = LocalJob::new(JobConfig::new(sum_args).defer("x"));

        let err = job.execute_sync(vec![], Kwargs::new()).unwrap_err();

        assert_eq!(err, JobError::insufficient_arguments("x"));
        assert_eq!(job.status().state(), RunningStatus::Waiting);
    }

    #[test]
    fn cancel_before_start() {
        let job = LocalJob::from_fn(sum_args);

        assert!(job.cancel());
        assert_eq!(job.status().state(), RunningStatus::Cancelled);
        assert_eq!(
            job.execute_async(vec![], Kwargs::new()).unwrap_err(),
            JobError::AlreadyStarted
        );
    }

    #[test]
    fn cancel_after_completion_is_a_no_op() {
        let job = LocalJob::from_fn(sum_args);
        job.execute_sync(vec![json!(1)], Kwargs::new()).unwrap();

        assert!(!job.cancel());
        assert_eq!(job.status().state(), RunningStatus::Success);
    }

    #[test]
    fn worker_thread_gets_configured_stack_size() {
        let job = LocalJob::with_config(
            JobConfig::new(|_args: Args, _kwargs: Kwargs| -> Result<JsonValue, String> {
                // 256 KiB on the worker's stack.
                let buffer = [1u8; 256 * 1024];
                Ok(json!(buffer.iter().map(|b| *b as u64).sum::<u64>()))
            }),
            LocalJobConfig::default().with_stack_size(4 * 1024 * 1024),
        );

        job.execute_async(vec![], Kwargs::new()).unwrap();

        assert_eq!(job.wait().state(), RunningStatus::Success);
        assert_eq!(job.get_results().unwrap().results, json!(256 * 1024));
    }

    #[test]
    fn async_job_runs_on_named_thread() {
        let job = LocalJob::with_config(
            JobConfig::new(|_args: Args, _kwargs: Kwargs| -> Result<JsonValue, String> {
                Ok(json!(thread::current().name().map(str::to_string)))
            }),
            LocalJobConfig::default().with_thread_name("sampler-7"),
        );

        job.execute_async(vec![], Kwargs::new()).unwrap();
        let status = job.wait();

        assert_eq!(status.state(), RunningStatus::Success);
        assert_eq!(job.get_results().unwrap().results, json!("sampler-7"));
    }
}
