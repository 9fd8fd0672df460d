//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the orchestrator.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Shutdown timing (overall deadline, drain, callbacks).
    pub shutdown: ShutdownConfig,

    /// Servers hosted by this process, in registration order.
    pub servers: Vec<ServerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Shutdown timing configuration.
///
/// Every field has a default, so any subset may be overridden.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Hard deadline for the whole shutdown sequence, measured from the
    /// first termination request. Exceeding it force-exits the process.
    pub overall_timeout_ms: u64,

    /// Flat wait between rejecting new requests and stopping servers.
    pub drain_wait_ms: u64,

    /// Deadline handed to each shutdown callback, measured from that
    /// callback's own start.
    pub callback_timeout_ms: u64,

    /// Upper bound for a single server's stop operation.
    /// `None` leaves the stop unbounded; only the overall timeout applies.
    pub server_stop_timeout_ms: Option<u64>,

    /// Pause after release hooks so asynchronous sinks can flush.
    pub release_pause_ms: u64,
}

impl ShutdownConfig {
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    pub fn drain_wait(&self) -> Duration {
        Duration::from_millis(self.drain_wait_ms)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    pub fn server_stop_timeout(&self) -> Option<Duration> {
        self.server_stop_timeout_ms.map(Duration::from_millis)
    }

    pub fn release_pause(&self) -> Duration {
        Duration::from_millis(self.release_pause_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            overall_timeout_ms: 30_000,
            drain_wait_ms: 10_000,
            callback_timeout_ms: 3_000,
            server_stop_timeout_ms: None,
            release_pause_ms: 1_000,
        }
    }
}

/// A single hosted server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Stable name used in logs and metrics labels.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub log_filter: String,

    /// Output format for log lines.
    pub log_format: LogFormat,

    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Address for the Prometheus endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "shutdown_orchestrator=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
