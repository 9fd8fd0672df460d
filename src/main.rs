//! Graceful shutdown orchestrator
//!
//! Hosts several HTTP servers in one process and shuts them down in order.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌────────────────────────────────────────────────────────────────────┐
//!   │                              App                                   │
//!   │                                                                    │
//!   │   ┌──────────────┐ ┌──────────────┐          ┌─────────────────┐  │
//!   │   │ ManagedServer│ │ ManagedServer│   ...    │ SignalListener  │  │
//!   │   │  (serve task)│ │  (serve task)│          │  SIGINT/SIGTERM │  │
//!   │   └──────▲───────┘ └──────▲───────┘          └────────┬────────┘  │
//!   │          │                │                           │           │
//!   │          │   reject/stop  │                           ▼           │
//!   │   ┌──────┴────────────────┴──────┐  run    ┌─────────────────┐   │
//!   │   │      ShutdownSequencer       │◀────────│    Watchdog     │   │
//!   │   │ reject → drain → stop →      │         │ 2nd signal /    │   │
//!   │   │ callbacks → release → done   │────────▶│ overall timeout │   │
//!   │   └──────────────────────────────┘  done   └─────────────────┘   │
//!   └────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use axum::{routing::get, Json};
use clap::Parser;
use serde_json::json;

use shutdown_orchestrator::config::{load_config, AppConfig, ServerConfig};
use shutdown_orchestrator::lifecycle::shutdown_callback;
use shutdown_orchestrator::observability::{logging, metrics};
use shutdown_orchestrator::{App, ManagedServer};

#[derive(Parser)]
#[command(name = "shutdown-orchestrator")]
#[command(about = "Run several HTTP servers with ordered graceful shutdown", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if config.servers.is_empty() {
        config.servers = default_servers();
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("shutdown-orchestrator v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        servers = config.servers.len(),
        overall_timeout_ms = config.shutdown.overall_timeout_ms,
        drain_wait_ms = config.shutdown.drain_wait_ms,
        callback_timeout_ms = config.shutdown.callback_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut builder = App::builder().config(config.shutdown.clone());
    for server in &config.servers {
        builder = builder.server(demo_server(server));
    }

    let app = builder
        .shutdown_callback(shutdown_callback(|ctx| async move {
            tracing::info!(remaining_ms = ctx.remaining().as_millis() as u64, "Flushing demo state");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(200)) => {
                    tracing::info!("Demo state flushed");
                }
                _ = ctx.cancelled() => {
                    tracing::warn!("Demo flush cut short by its deadline");
                }
            }
        }))
        .on_release(|| tracing::info!("Shared handles closed"))
        .build()?;

    app.serve_until_exit().await
}

fn default_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            name: "business".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
        },
        ServerConfig {
            name: "admin".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        },
    ]
}

fn demo_server(config: &ServerConfig) -> ManagedServer {
    let name = config.name.clone();
    ManagedServer::new(&config.name, &config.bind_address)
        .route("/", get(|| async { "hello" }))
        .route(
            "/status",
            get(move || {
                let name = name.clone();
                async move { Json(json!({ "server": name, "status": "serving" })) }
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "finally"
            }),
        )
}
