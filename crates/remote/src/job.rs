//! Jobs executed by a remote service.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use jobkit_core::{
    Args, CancelOutcome, Job, JobConfig, JobCore, JobError, JobId, JobResult, JobResults,
    JobStatus, Kwargs, RunningStatus,
};

use crate::config::RemoteJobConfig;
use crate::transport::{JobTransport, RemoteRequest};

/// Job submitted to a remote service through a [`JobTransport`].
///
/// The service assigns the identifier on submission. Status is polled from the
/// transport; results are downloaded once the service reports success and are
/// published together with that status.
pub struct RemoteJob {
    command: String,
    core: JobCore,
    transport: Arc<dyn JobTransport>,
    config: RemoteJobConfig,
}

impl RemoteJob {
    pub fn new(transport: Arc<dyn JobTransport>, config: JobConfig<String>) -> Self {
        Self::with_config(transport, config, RemoteJobConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn JobTransport>,
        config: JobConfig<String>,
        remote: RemoteJobConfig,
    ) -> Self {
        let (command, core) = config.into_parts();
        Self {
            command,
            core,
            transport,
            config: remote,
        }
    }

    /// Re-attach to a job submitted earlier.
    ///
    /// Delta parameters in `config` should hold the values captured at submission
    /// (as fixed entries) so the result mapping sees the same keyword arguments.
    pub fn from_id(
        transport: Arc<dyn JobTransport>,
        id: JobId,
        config: JobConfig<String>,
        remote: RemoteJobConfig,
    ) -> JobResult<Self> {
        let job = Self::with_config(transport, config, remote);
        job.core.assign_id(id)?;
        job.core.begin()?;
        job.refresh()?;
        Ok(job)
    }

    /// Poll the transport and publish what it reports.
    ///
    /// Terminal statuses are sticky: once one is stored the transport is no longer queried.
    pub fn refresh(&self) -> JobResult<JobStatus> {
        let current = self.core.status();
        let Some(id) = self.core.id() else {
            return Ok(current);
        };
        if current.completed() {
            return Ok(current);
        }

        let remote = self.transport.status(id)?;
        let results = match remote.state() {
            RunningStatus::Success => Some(self.transport.results(id)?),
            _ => None,
        };
        debug!(job_id = %id, status = %remote.state(), progress = remote.progress(), "polled remote job");
        self.core.publish_status(remote, results)?;
        Ok(self.core.status())
    }

    /// Poll until the job is terminal or `max_wait` elapses.
    pub fn wait(&self) -> JobResult<JobStatus> {
        let started = Instant::now();
        loop {
            let status = self.refresh()?;
            if status.completed() {
                return Ok(status);
            }
            if let Some(max_wait) = self.config.max_wait {
                if started.elapsed() >= max_wait {
                    warn!(job_id = ?self.core.id(), ?max_wait, "gave up waiting for remote job");
                    return Err(JobError::Timeout(max_wait));
                }
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Cancel the job.
    ///
    /// A job that was never executed is cancelled locally. A submitted job is
    /// cancelled through the transport; if the submission is still in flight the
    /// request is forwarded as soon as the service assigns the identifier.
    pub fn cancel(&self) -> JobResult<JobStatus> {
        if let Some(id) = self.core.id() {
            return self.cancel_remote(id);
        }
        match self.core.request_cancel() {
            CancelOutcome::Requested => {
                // Whichever side sees both the identifier and the request forwards it.
                if let Some(id) = self.core.id() {
                    if self.core.take_cancel_request() {
                        return self.cancel_remote(id);
                    }
                }
                debug!(command = %self.command, "cancellation queued until submission completes");
                Ok(self.core.status())
            }
            CancelOutcome::Cancelled | CancelOutcome::Finished => Ok(self.core.status()),
        }
    }

    fn cancel_remote(&self, id: JobId) -> JobResult<JobStatus> {
        self.transport.cancel(id)?;
        info!(job_id = %id, "remote job cancellation requested");
        self.refresh()
    }
}

impl Job for RemoteJob {
    fn core(&self) -> &JobCore {
        &self.core
    }

    fn status(&self) -> JobStatus {
        self.refresh().unwrap_or_else(|e| {
            warn!(job_id = ?self.core.id(), error = %e, "remote status poll failed");
            self.core.status()
        })
    }

    fn execute_sync(&self, args: Args, kwargs: Kwargs) -> JobResult<JobResults> {
        self.execute_async(args, kwargs)?;
        self.wait()?;
        self.get_results()
    }

    fn execute_async(&self, args: Args, kwargs: Kwargs) -> JobResult<()> {
        if self.core.id().is_some() {
            return Err(JobError::AlreadyStarted);
        }
        let (args, kwargs) = self.core.start(args, kwargs)?;
        let request = RemoteRequest::new(self.command.clone(), args, kwargs);

        match self.transport.submit(&request) {
            Ok(id) => {
                self.core.assign_id(id)?;
                info!(job_id = %id, command = %self.command, "remote job submitted");
                if self.core.take_cancel_request() {
                    self.transport.cancel(id)?;
                    info!(job_id = %id, "forwarded cancellation requested during submission");
                }
                Ok(())
            }
            Err(e) => {
                warn!(command = %self.command, error = %e, "remote job submission failed");
                self.core.publish_failure(e.to_string()).ok();
                Err(e.into())
            }
        }
    }
}
