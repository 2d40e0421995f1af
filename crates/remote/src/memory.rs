//! In-memory stand-in for a remote job service (tests/dev).

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;

use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};

use jobkit_core::{JobId, JobResults, JobStatus, RunningStatus};

use crate::transport::{JobTransport, RemoteRequest, TransportError};

/// Handler executing a submitted command on the "remote" side.
pub type RemoteHandler =
    Arc<dyn Fn(&RemoteRequest, &RemoteContext) -> Result<JsonValue, String> + Send + Sync>;

type Entries = Arc<RwLock<HashMap<JobId, RemoteEntry>>>;

#[derive(Debug)]
struct RemoteEntry {
    request: RemoteRequest,
    status: JobStatus,
    results: Option<JobResults>,
    cancel_requested: bool,
}

/// Per-job handle given to a handler while it runs.
#[derive(Clone)]
pub struct RemoteContext {
    id: JobId,
    entries: Entries,
}

impl RemoteContext {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Publish progress for this job. Ignored once the job left `Running`.
    pub fn report_progress(&self, progress: f64, message: Option<String>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&self.id) {
            entry.status.update_progress(progress, message).ok();
        }
    }

    /// Whether cancellation was requested; handlers may poll this to stop early.
    pub fn is_cancelled(&self) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&self.id).is_some_and(|e| e.cancel_requested)
    }
}

/// In-memory job service.
///
/// Commands are routed to handlers by exact name, then by `prefix.*` pattern, then
/// by the `*` wildcard. By default every submission runs on its own thread; a
/// [`paused`](Self::paused) transport queues submissions until
/// [`process_next`](Self::process_next) runs them on the calling thread.
pub struct InMemoryTransport {
    handlers: HashMap<String, RemoteHandler>,
    entries: Entries,
    queue: Mutex<VecDeque<JobId>>,
    paused: bool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            entries: Arc::new(RwLock::new(HashMap::new())),
            queue: Mutex::new(VecDeque::new()),
            paused: false,
        }
    }

    /// A transport that only runs jobs when told to.
    pub fn paused() -> Self {
        Self {
            paused: true,
            ..Self::new()
        }
    }

    /// Register a handler for a command name or pattern.
    pub fn register_handler<F>(&mut self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(&RemoteRequest, &RemoteContext) -> Result<JsonValue, String> + Send + Sync + 'static,
    {
        self.handlers.insert(pattern.into(), Arc::new(handler));
    }

    fn handler_for(&self, command: &str) -> Option<RemoteHandler> {
        if let Some(h) = self.handlers.get(command) {
            return Some(h.clone());
        }

        // Longest matching `prefix.*` pattern wins.
        let category = self
            .handlers
            .iter()
            .filter_map(|(pattern, handler)| {
                let prefix = pattern.strip_suffix(".*")?;
                command
                    .starts_with(prefix)
                    .then_some((prefix.len(), handler))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, handler)| handler.clone());
        if category.is_some() {
            return category;
        }

        self.handlers.get("*").cloned()
    }

    /// Run the oldest queued submission on the calling thread.
    ///
    /// Returns the identifier of the job that ran, or `None` if the queue was empty.
    pub fn process_next(&self) -> Option<JobId> {
        let id = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()?;
        let command = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries.get(&id)?.request.command.clone()
        };
        match self.handler_for(&command) {
            Some(handler) => run_entry(&self.entries, id, &handler),
            None => warn!(job_id = %id, command = %command, "handler disappeared"),
        }
        Some(id)
    }

    /// Number of submissions waiting in a paused transport.
    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The request a job was submitted with.
    pub fn request(&self, id: JobId) -> Option<RemoteRequest> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).map(|e| e.request.clone())
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTransport for InMemoryTransport {
    fn submit(&self, request: &RemoteRequest) -> Result<JobId, TransportError> {
        let handler = self
            .handler_for(&request.command)
            .ok_or_else(|| TransportError::UnknownCommand(request.command.clone()))?;

        let id = JobId::new();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                RemoteEntry {
                    request: request.clone(),
                    status: JobStatus::new(),
                    results: None,
                    cancel_requested: false,
                },
            );

        if self.paused {
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(id);
            debug!(job_id = %id, command = %request.command, "remote job queued");
            return Ok(id);
        }

        let entries = self.entries.clone();
        thread::Builder::new()
            .name("jobkit-remote".to_string())
            .spawn(move || run_entry(&entries, id, &handler))
            .map_err(|e| {
                self.entries
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                TransportError::Io(format!("failed to spawn remote worker: {e}"))
            })?;

        debug!(job_id = %id, command = %request.command, "remote job dispatched");
        Ok(id)
    }

    fn status(&self, id: JobId) -> Result<JobStatus, TransportError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&id)
            .map(|e| e.status.clone())
            .ok_or(TransportError::NotFound(id))
    }

    fn results(&self, id: JobId) -> Result<JobResults, TransportError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(&id).ok_or(TransportError::NotFound(id))?;
        match (&entry.results, entry.status.state()) {
            (Some(results), RunningStatus::Success) => Ok(results.clone()),
            _ => Err(TransportError::NotReady(id)),
        }
    }

    fn cancel(&self, id: JobId) -> Result<(), TransportError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get_mut(&id).ok_or(TransportError::NotFound(id))?;
        match entry.status.state() {
            RunningStatus::Waiting => {
                entry.status.cancel().ok();
            }
            RunningStatus::Running => entry.cancel_requested = true,
            _ => {}
        }
        Ok(())
    }
}

fn run_entry(entries: &Entries, id: JobId, handler: &RemoteHandler) {
    let request = {
        let mut guard = entries.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = guard.get_mut(&id) else {
            return;
        };
        // Cancelled while queued.
        if entry.status.start_run().is_err() {
            return;
        }
        entry.request.clone()
    };

    let ctx = RemoteContext {
        id,
        entries: entries.clone(),
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&request, &ctx)));

    let mut guard = entries.write().unwrap_or_else(PoisonError::into_inner);
    let Some(entry) = guard.get_mut(&id) else {
        return;
    };
    let published = if entry.cancel_requested {
        entry.status.cancel()
    } else {
        match outcome {
            Ok(Ok(value)) => {
                entry.results =
                    Some(JobResults::new(value).with_extra("job_id", json!(id.to_string())));
                entry.status.succeed()
            }
            Ok(Err(error)) => entry.status.fail(error),
            Err(_) => entry.status.fail("remote handler panicked"),
        }
    };
    if let Err(e) = published {
        warn!(job_id = %id, error = %e, "remote job outcome not recorded");
    }
    debug!(job_id = %id, status = %entry.status.state(), "remote job finished");
}
