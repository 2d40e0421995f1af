//! Local and remote jobs driven through the same `Job` interface.

use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use serde_json::{Value as JsonValue, json};

use jobkit_core::{Args, Job, JobConfig, JobError, JobResults, Kwargs, RunningStatus};
use jobkit_local::LocalJob;
use jobkit_remote::{InMemoryTransport, RemoteContext, RemoteJob, RemoteJobConfig, RemoteRequest};

/// Counts how many positional arguments the backend received, scaled by `shots`.
fn count_args(args: &Args, kwargs: &Kwargs) -> JsonValue {
    let shots = kwargs.get("shots").and_then(JsonValue::as_i64).unwrap_or(1);
    json!(args.len() as i64 * shots)
}

fn label_results(results: JsonValue, params: &Kwargs) -> Result<JsonValue, String> {
    let label = params
        .get("label")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| "label not captured".to_string())?;
    let mut labelled = serde_json::Map::new();
    labelled.insert(label.to_string(), results);
    Ok(JsonValue::Object(labelled))
}

/// Start a job asynchronously, then poll it through the trait until it is done.
fn run_through_trait(job: &dyn Job, args: Args) -> Result<JobResults, JobError> {
    job.execute_async(args, Kwargs::new())?;
    for _ in 0..2_000 {
        if job.is_completed() {
            return job.get_results();
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    Err(JobError::NotCompleted)
}

#[test]
fn local_and_remote_jobs_agree() {
    jobkit_observability::init();

    let local = LocalJob::new(
        JobConfig::new(|args: Args, kwargs: Kwargs| -> Result<JsonValue, String> {
            Ok(count_args(&args, &kwargs))
        })
        .defer("label")
        .fix("shots", json!(10))
        .with_result_mapping(label_results),
    );

    let mut transport = InMemoryTransport::new();
    transport.register_handler("count", |req: &RemoteRequest, _ctx: &RemoteContext| {
        Ok(count_args(&req.args, &req.kwargs))
    });
    let remote = RemoteJob::with_config(
        Arc::new(transport),
        JobConfig::new("count".to_string())
            .defer("label")
            .fix("shots", json!(10))
            .with_result_mapping(label_results),
        RemoteJobConfig::default().with_poll_interval(Duration::from_millis(1)),
    );

    let args = vec![json!("bell"), json!(1), json!(2), json!(3)];
    let from_local = run_through_trait(&local, args.clone()).unwrap();
    let from_remote = run_through_trait(&remote, args).unwrap();

    assert_eq!(from_local.results, json!({"bell": 30}));
    assert_eq!(from_remote.results, from_local.results);
    assert!(local.id().is_none());
    assert!(remote.id().is_some());
}

#[test]
fn remote_progress_is_observable_while_running() {
    jobkit_observability::init();

    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (reported_tx, reported_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let reported_tx = Mutex::new(reported_tx);

    let mut transport = InMemoryTransport::new();
    transport.register_handler("slow", move |_req: &RemoteRequest, ctx: &RemoteContext| {
        ctx.report_progress(0.5, Some("sampling".to_string()));
        reported_tx
            .lock()
            .map_err(|e| e.to_string())?
            .send(())
            .map_err(|e| e.to_string())?;
        release_rx
            .lock()
            .map_err(|e| e.to_string())?
            .recv()
            .map_err(|e| e.to_string())?;
        Ok(json!("done"))
    });

    let job = RemoteJob::with_config(
        Arc::new(transport),
        JobConfig::new("slow".to_string()),
        RemoteJobConfig::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_max_wait(Duration::from_secs(10)),
    );

    job.execute_async(vec![], Kwargs::new()).unwrap();
    reported_rx.recv().unwrap();

    let status = job.status();
    assert_eq!(status.state(), RunningStatus::Running);
    assert_eq!(status.progress(), 0.5);
    assert_eq!(status.progress_message(), Some("sampling"));
    assert_eq!(job.get_results().unwrap_err(), JobError::NotCompleted);

    release_tx.send(()).unwrap();
    let status = job.wait().unwrap();

    assert_eq!(status.state(), RunningStatus::Success);
    assert_eq!(job.get_results().unwrap().results, json!("done"));
}
