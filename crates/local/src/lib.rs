//! `jobkit-local`
//!
//! **Responsibility:** run jobs in-process.
//!
//! - `execute_sync` runs the callable on the calling thread.
//! - `execute_async` runs it on a dedicated background thread.
//! - Cancellation is cooperative: a running callable is never interrupted, its
//!   outcome is discarded.

pub mod config;
pub mod job;

pub use config::LocalJobConfig;
pub use job::{JobFn, LocalJob};
