//! The contract a hosted server offers to the shutdown sequence.
//!
//! The orchestrator only needs three things from a server: a blocking serve
//! loop, a one-way switch that turns new requests away, and a stop operation.
//! `ManagedServer` implements this for axum; tests implement it with mocks.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for server lifecycle operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server `{name}` has invalid listen address `{address}`")]
    InvalidAddress { name: String, address: String },

    #[error("server `{name}` failed to bind: {source}")]
    Bind {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server `{0}` was already started")]
    AlreadyStarted(String),

    #[error("server `{name}` failed while serving: {source}")]
    Serve {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server `{0}` exited without a stop request")]
    UnexpectedExit(String),

    #[error("server `{name}` did not stop within {timeout:?}")]
    StopTimeout { name: String, timeout: Duration },

    #[error("server `{name}`: {message}")]
    Other { name: String, message: String },
}

/// A network server managed by the orchestrator.
#[async_trait]
pub trait Server: Send + Sync {
    /// Stable name for logs and metrics.
    fn name(&self) -> &str;

    /// Serve until stopped.
    ///
    /// Returns `Ok(())` only when the server was closed through [`Server::stop`];
    /// any other way out is an error.
    async fn start(&self) -> Result<(), ServerError>;

    /// Turn away every request evaluated after this call returns.
    ///
    /// One-way and non-blocking.
    fn reject_new_requests(&self);

    /// Stop accepting connections and wait for accepted ones to finish.
    ///
    /// `timeout` bounds the wait; `None` waits as long as it takes.
    async fn stop(&self, timeout: Option<Duration>) -> Result<(), ServerError>;

    /// Requests currently being handled. Informational only.
    fn in_flight(&self) -> u64 {
        0
    }
}
