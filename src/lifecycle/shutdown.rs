//! The ordered shutdown sequence.
//!
//! # States
//! ```text
//! Idle → Rejecting → Draining → StoppingServers → RunningCallbacks
//!      → ReleasingResources → Done
//! ```
//!
//! # Phase Policy
//! - Rejecting: flip every server's reject switch, in registration order
//! - Draining: flat sleep of `drain_wait`, blind to in-flight work
//! - StoppingServers: stop all servers concurrently, wait for every one,
//!   log and swallow failures
//! - RunningCallbacks: run all callbacks concurrently, each with its own
//!   deadline context, wait for every one to return
//! - ReleasingResources: run release hooks, pause for sinks to flush
//!
//! Once the sequence is abandoned, no further release hook starts. A hook
//! already running when the watchdog gives up finishes on its own thread.
//!
//! Each fan-out phase owns a fresh `JoinSet`; no barrier outlives its phase.
//! A callback ignoring its deadline holds up the sequence; only the
//! watchdog's overall timeout can cut it short.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::ShutdownConfig;
use crate::lifecycle::callbacks::CallbackRegistry;
use crate::lifecycle::context::ShutdownContext;
use crate::lifecycle::server::Server;
use crate::observability::metrics;

/// Process-wide cleanup run once during `ReleasingResources`.
pub type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// Where the shutdown sequence currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShutdownPhase {
    Idle,
    Rejecting,
    Draining,
    StoppingServers,
    RunningCallbacks,
    ReleasingResources,
    Done,
}

impl ShutdownPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownPhase::Idle => "idle",
            ShutdownPhase::Rejecting => "rejecting",
            ShutdownPhase::Draining => "draining",
            ShutdownPhase::StoppingServers => "stopping_servers",
            ShutdownPhase::RunningCallbacks => "running_callbacks",
            ShutdownPhase::ReleasingResources => "releasing_resources",
            ShutdownPhase::Done => "done",
        }
    }
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a completed shutdown run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Servers whose stop returned `Ok`.
    pub servers_stopped: usize,
    /// Servers whose stop failed or panicked.
    pub stop_failures: usize,
    /// Callbacks that returned.
    pub callbacks_run: usize,
    /// Time from `Rejecting` to `Done`.
    pub elapsed: Duration,
}

/// Runs the five shutdown phases, at most once.
pub struct ShutdownSequencer {
    servers: Vec<Arc<dyn Server>>,
    callbacks: CallbackRegistry,
    release_hooks: Mutex<Vec<ReleaseHook>>,
    config: ShutdownConfig,
    phase: watch::Sender<ShutdownPhase>,
    started: AtomicBool,
    abandoned: AtomicBool,
}

impl ShutdownSequencer {
    pub fn new(
        servers: Vec<Arc<dyn Server>>,
        callbacks: CallbackRegistry,
        release_hooks: Vec<ReleaseHook>,
        config: ShutdownConfig,
    ) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Idle);
        Self {
            servers,
            callbacks,
            release_hooks: Mutex::new(release_hooks),
            config,
            phase,
            started: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }

    /// Whether a run has been triggered.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Give up on the sequence. Release hooks that have not started are skipped.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Run the whole sequence.
    ///
    /// Returns `None` without doing anything if a run was already triggered,
    /// and `None` without reaching `Done` if the run was abandoned.
    pub async fn run(&self) -> Option<ShutdownReport> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Shutdown already in progress, ignoring trigger");
            return None;
        }

        let started_at = Instant::now();
        tracing::info!(
            servers = self.servers.len(),
            callbacks = self.callbacks.len(),
            "Shutting down application"
        );

        self.reject_new_requests();
        self.drain().await;
        let (servers_stopped, stop_failures) = self.stop_servers().await;
        let callbacks_run = self.run_callbacks().await;
        self.release_resources().await;
        if self.is_abandoned() {
            return None;
        }

        let elapsed = started_at.elapsed();
        self.enter(ShutdownPhase::Done);
        metrics::record_shutdown_duration(elapsed);
        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "Application closed");

        Some(ShutdownReport {
            servers_stopped,
            stop_failures,
            callbacks_run,
            elapsed,
        })
    }

    fn enter(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
        metrics::record_phase(phase.as_str());
        tracing::debug!(phase = %phase, "Entered shutdown phase");
    }

    fn reject_new_requests(&self) {
        self.enter(ShutdownPhase::Rejecting);
        tracing::info!("Rejecting new requests");
        for server in &self.servers {
            server.reject_new_requests();
            tracing::debug!(server = %server.name(), "Server now rejecting requests");
        }
    }

    async fn drain(&self) {
        self.enter(ShutdownPhase::Draining);
        let wait = self.config.drain_wait();
        tracing::info!(
            wait_ms = wait.as_millis() as u64,
            in_flight = self.in_flight(),
            "Waiting for in-flight requests"
        );
        tokio::time::sleep(wait).await;
        tracing::debug!(in_flight = self.in_flight(), "Drain interval elapsed");
    }

    fn in_flight(&self) -> u64 {
        self.servers.iter().map(|s| s.in_flight()).sum()
    }

    async fn stop_servers(&self) -> (usize, usize) {
        self.enter(ShutdownPhase::StoppingServers);
        tracing::info!("Stopping servers");

        let timeout = self.config.server_stop_timeout();
        let mut stops = JoinSet::new();
        for server in &self.servers {
            let server = Arc::clone(server);
            stops.spawn(async move {
                tracing::info!(server = %server.name(), "Server stopping");
                match server.stop(timeout).await {
                    Ok(()) => {
                        tracing::info!(server = %server.name(), "Server stopped");
                        true
                    }
                    Err(e) => {
                        tracing::error!(server = %server.name(), error = %e, "Failed to stop server");
                        metrics::record_stop_failure(server.name());
                        false
                    }
                }
            });
        }

        let mut stopped = 0;
        let mut failed = 0;
        while let Some(result) = stops.join_next().await {
            match result {
                Ok(true) => stopped += 1,
                Ok(false) => failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Stop task panicked");
                    failed += 1;
                }
            }
        }
        (stopped, failed)
    }

    async fn run_callbacks(&self) -> usize {
        self.enter(ShutdownPhase::RunningCallbacks);
        tracing::info!(callbacks = self.callbacks.len(), "Running shutdown callbacks");

        let timeout = self.config.callback_timeout();
        let mut tasks = JoinSet::new();
        for (index, callback) in self.callbacks.iter().enumerate() {
            let callback = Arc::clone(callback);
            tasks.spawn(async move {
                let ctx = ShutdownContext::with_timeout(timeout);
                callback(ctx.clone()).await;
                if Instant::now() > ctx.deadline() {
                    tracing::warn!(callback = index, "Shutdown callback overran its deadline");
                }
                ctx.release();
                metrics::record_callback_done();
            });
        }

        let mut completed = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(()) => completed += 1,
                Err(e) => tracing::error!(error = %e, "Shutdown callback panicked"),
            }
        }
        completed
    }

    async fn release_resources(&self) {
        self.enter(ShutdownPhase::ReleasingResources);
        tracing::info!("Releasing resources");

        let hooks = std::mem::take(
            &mut *self
                .release_hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let total = hooks.len();
        for (index, hook) in hooks.into_iter().enumerate() {
            if self.is_abandoned() {
                tracing::warn!(skipped = total - index, "Shutdown abandoned, skipping release hooks");
                return;
            }
            hook();
        }

        tokio::time::sleep(self.config.release_pause()).await;
    }
}

impl std::fmt::Debug for ShutdownSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSequencer")
            .field("servers", &self.servers.len())
            .field("callbacks", &self.callbacks)
            .field("phase", &self.phase())
            .finish()
    }
}
