//! Background execution: status visibility while running, cancellation, result publication.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use serde_json::{Value as JsonValue, json};

use jobkit_core::{Args, Job, JobConfig, JobError, Kwargs, RunningStatus};
use jobkit_local::LocalJob;

/// A job whose callable blocks until the test sends it a value.
fn gated_job() -> (LocalJob, mpsc::Sender<i64>, mpsc::Receiver<()>) {
    let (release_tx, release_rx) = mpsc::channel::<i64>();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let release_rx = Arc::new(Mutex::new(release_rx));

    let job = LocalJob::new(
        JobConfig::new(move |args: Args, _kwargs: Kwargs| -> Result<JsonValue, String> {
            started_tx.send(()).map_err(|e| e.to_string())?;
            let extra = release_rx
                .lock()
                .map_err(|e| e.to_string())?
                .recv()
                .map_err(|e| e.to_string())?;
            let base = args.first().and_then(JsonValue::as_i64).unwrap_or(0);
            Ok(json!(base + extra))
        })
        .defer("factor")
        .with_result_mapping(|results, params| {
            let factor = params
                .get("factor")
                .and_then(JsonValue::as_i64)
                .ok_or_else(|| "factor not captured".to_string())?;
            let value = results.as_i64().ok_or_else(|| "expected integer".to_string())?;
            Ok(json!(value * factor))
        }),
    );

    (job, release_tx, started_rx)
}

#[test]
fn execute_async_returns_before_the_callable_finishes() {
    jobkit_observability::init();
    let (job, release, started) = gated_job();

    job.execute_async(vec![json!(10), json!(1)], Kwargs::new())
        .unwrap();
    started.recv().unwrap();

    assert_eq!(job.status().state(), RunningStatus::Running);
    assert!(!job.is_completed());
    assert_eq!(job.get_results().unwrap_err(), JobError::NotCompleted);

    release.send(5).unwrap();
    let status = job.wait();

    assert_eq!(status.state(), RunningStatus::Success);
    // factor = 10 (captured), callable sees args [1]: (1 + 5) * 10
    assert_eq!(job.get_results().unwrap().results, json!(60));
    assert!(status.duration().is_some());
}

#[test]
fn cancelling_a_running_job_discards_its_outcome() {
    jobkit_observability::init();
    let (job, release, started) = gated_job();

    job.execute_async(vec![json!(2)], Kwargs::new()).unwrap();
    started.recv().unwrap();

    assert!(job.cancel());
    release.send(1).unwrap();
    let status = job.wait();

    assert_eq!(status.state(), RunningStatus::Cancelled);
    assert!(matches!(
        job.get_results().unwrap_err(),
        JobError::ExecutionFailed {
            state: RunningStatus::Cancelled,
            ..
        }
    ));
}

#[test]
fn wait_without_async_execution_returns_current_status() {
    let job = LocalJob::from_fn(|_args, _kwargs| Ok(json!(null)));

    assert_eq!(job.wait().state(), RunningStatus::Waiting);
}
