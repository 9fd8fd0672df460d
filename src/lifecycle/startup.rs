//! Application coordinator.
//!
//! # Responsibilities
//! - Assemble servers, callbacks and release hooks with shutdown timing
//! - Start every server on its own task
//! - Hand termination requests to the watchdog
//!
//! # Design Decisions
//! - Timing is an explicit `ShutdownConfig`; builder setters mutate it
//!   before `build()` freezes it
//! - Servers are fixed at `build()`; nothing can be registered afterwards
//! - A server that fails to serve is logged; it never takes the process down

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

use crate::config::ShutdownConfig;
use crate::lifecycle::callbacks::{CallbackRegistry, ShutdownCallback};
use crate::lifecycle::server::{Server, ServerError};
use crate::lifecycle::shutdown::{ReleaseHook, ShutdownPhase, ShutdownSequencer};
use crate::lifecycle::signals::{ShutdownHandle, SignalListener};
use crate::lifecycle::watchdog::{ShutdownOutcome, Watchdog};

/// Error type for assembling an [`App`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("server `{0}` is registered more than once")]
    DuplicateServer(String),

    #[error("overall shutdown timeout must be greater than zero")]
    ZeroOverallTimeout,
}

/// Whole milliseconds, rounded up so a configured wait is never shorter
/// than the requested one.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// Builder for [`App`]. Starts from the default timing.
#[derive(Default)]
pub struct AppBuilder {
    config: ShutdownConfig,
    servers: Vec<Arc<dyn Server>>,
    callbacks: CallbackRegistry,
    release_hooks: Vec<ReleaseHook>,
    skip_os_signals: bool,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole timing configuration.
    pub fn config(mut self, config: ShutdownConfig) -> Self {
        self.config = config;
        self
    }

    /// Apply an arbitrary mutation to the timing configuration.
    pub fn configure(mut self, f: impl FnOnce(&mut ShutdownConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn overall_shutdown_timeout(self, timeout: Duration) -> Self {
        self.configure(|c| c.overall_timeout_ms = millis(timeout))
    }

    pub fn drain_wait_time(self, wait: Duration) -> Self {
        self.configure(|c| c.drain_wait_ms = millis(wait))
    }

    pub fn callback_timeout(self, timeout: Duration) -> Self {
        self.configure(|c| c.callback_timeout_ms = millis(timeout))
    }

    /// Bound each server's stop. Unbounded unless set.
    pub fn server_stop_timeout(self, timeout: Duration) -> Self {
        self.configure(|c| c.server_stop_timeout_ms = Some(millis(timeout)))
    }

    pub fn release_pause(self, pause: Duration) -> Self {
        self.configure(|c| c.release_pause_ms = millis(pause))
    }

    /// Register a server. Registration order is rejection order.
    pub fn server(self, server: impl Server + 'static) -> Self {
        self.shared_server(Arc::new(server))
    }

    /// Register a server the caller keeps a handle to.
    pub fn shared_server(mut self, server: Arc<dyn Server>) -> Self {
        self.servers.push(server);
        self
    }

    pub fn shutdown_callback(mut self, callback: ShutdownCallback) -> Self {
        self.callbacks.register(callback);
        self
    }

    pub fn shutdown_callbacks(mut self, callbacks: impl IntoIterator<Item = ShutdownCallback>) -> Self {
        self.callbacks.extend(callbacks);
        self
    }

    /// Run `hook` once while releasing resources, after all callbacks.
    pub fn on_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release_hooks.push(Box::new(hook));
        self
    }

    /// Whether `serve()` listens for SIGINT/SIGTERM. On by default.
    pub fn listen_os_signals(mut self, enabled: bool) -> Self {
        self.skip_os_signals = !enabled;
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        if self.config.overall_timeout_ms == 0 {
            return Err(BuildError::ZeroOverallTimeout);
        }

        let mut names = HashSet::new();
        for server in &self.servers {
            if !names.insert(server.name().to_string()) {
                return Err(BuildError::DuplicateServer(server.name().to_string()));
            }
        }

        let watchdog = Watchdog::new(self.config.overall_timeout());
        let sequencer = ShutdownSequencer::new(
            self.servers.clone(),
            self.callbacks,
            self.release_hooks,
            self.config,
        );

        Ok(App {
            servers: self.servers,
            sequencer: Arc::new(sequencer),
            watchdog,
            signals: SignalListener::new(),
            listen_os_signals: !self.skip_os_signals,
        })
    }
}

/// Hosts several servers and shuts them down in order.
pub struct App {
    servers: Vec<Arc<dyn Server>>,
    sequencer: Arc<ShutdownSequencer>,
    watchdog: Watchdog,
    signals: SignalListener,
    listen_os_signals: bool,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Request termination without an OS signal.
    pub fn handle(&self) -> ShutdownHandle {
        self.signals.handle()
    }

    /// Observe the shutdown sequence.
    pub fn phases(&self) -> watch::Receiver<ShutdownPhase> {
        self.sequencer.subscribe()
    }

    pub fn config(&self) -> &ShutdownConfig {
        self.sequencer.config()
    }

    /// Start all servers and block until shutdown finishes or is forced.
    ///
    /// On a forced outcome the sequence is abandoned: no later phase starts
    /// and release hooks not yet begun are skipped. A hook already running
    /// keeps its thread until it returns or the process exits.
    pub async fn serve(self) -> std::io::Result<ShutdownOutcome> {
        if self.listen_os_signals {
            self.signals.install_os_handlers()?;
        }

        for server in &self.servers {
            let server = Arc::clone(server);
            tokio::spawn(async move {
                tracing::info!(server = %server.name(), "Server starting");
                match server.start().await {
                    Ok(()) => tracing::info!(server = %server.name(), "Server closed"),
                    Err(e @ ServerError::AlreadyStarted(_)) => {
                        tracing::warn!(error = %e, "Server start ignored")
                    }
                    Err(e) => {
                        tracing::error!(server = %server.name(), error = %e, "Server exited abnormally")
                    }
                }
            });
        }

        let mut signals = self.signals.into_receiver();
        Ok(self.watchdog.supervise(&mut signals, self.sequencer).await)
    }

    /// [`App::serve`], then exit the process with the outcome's status.
    pub async fn serve_until_exit(self) -> ! {
        let code = match self.serve().await {
            Ok(outcome) => outcome.exit_code(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                1
            }
        };
        std::process::exit(code)
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("servers", &self.servers.len())
            .field("sequencer", &self.sequencer)
            .finish()
    }
}
