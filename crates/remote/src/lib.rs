//! `jobkit-remote`
//!
//! **Responsibility:** run jobs through a remote service.
//!
//! The service is reached through a [`JobTransport`]; this crate does not define a
//! wire protocol. [`InMemoryTransport`] plays the service in tests and local
//! development.

pub mod config;
pub mod job;
pub mod memory;
pub mod transport;

pub use config::RemoteJobConfig;
pub use job::RemoteJob;
pub use memory::{InMemoryTransport, RemoteContext, RemoteHandler};
pub use transport::{JobTransport, RemoteRequest, TransportError};
