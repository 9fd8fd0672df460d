//! Graceful shutdown orchestration for processes hosting several servers.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::AppConfig;
pub use http::ManagedServer;
pub use lifecycle::{
    shutdown_callback, App, AppBuilder, Server, ServerError, ShutdownContext, ShutdownOutcome,
    ShutdownPhase,
};
