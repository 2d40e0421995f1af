//! `jobkit-core` — the job contract shared by every execution backend.
//!
//! This crate contains **no execution machinery**. It defines:
//! - the status value backends publish (`JobStatus`, `RunningStatus`)
//! - the delta-parameter reintegration step (`DeltaParameters`)
//! - the result-retrieval contract (`Job::get_results`)
//!
//! Backends (in-process, remote) embed a [`JobCore`] and implement [`Job`].

pub mod error;
pub mod id;
pub mod job;
pub mod params;
pub mod results;
pub mod status;

pub use error::{JobError, JobResult};
pub use id::JobId;
pub use job::{CancelOutcome, Job, JobConfig, JobCore, ResultMapping};
pub use params::{Args, DeltaParameters, DeltaValue, Kwargs, Reintegration};
pub use results::JobResults;
pub use status::{JobStatus, RunningStatus};
