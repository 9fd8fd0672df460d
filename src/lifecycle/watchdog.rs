//! Termination watchdog.
//!
//! # Responsibilities
//! - Wait for the first termination request and start the shutdown sequence
//! - Race a second request and the overall deadline against completion
//! - Decide the process exit status
//!
//! # Design Decisions
//! - The race lives in a single `select!`; whichever branch loses is
//!   dropped, so no timer survives a clean shutdown
//! - A forced exit abandons and aborts the sequence task: no later phase
//!   begins and no further release hook starts
//! - The watchdog reports; the coordinator performs the actual exit

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::lifecycle::shutdown::{ShutdownReport, ShutdownSequencer};
use crate::lifecycle::signals::TerminationSignal;
use crate::observability::metrics;

/// Why the watchdog cut shutdown short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceReason {
    /// Another termination request arrived before `Done`.
    SecondSignal(TerminationSignal),
    /// The overall shutdown deadline elapsed.
    Timeout(Duration),
    /// The sequence task died without finishing.
    SequencerFailed,
}

impl ForceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForceReason::SecondSignal(_) => "second_signal",
            ForceReason::Timeout(_) => "timeout",
            ForceReason::SequencerFailed => "sequencer_failed",
        }
    }
}

/// How shutdown ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All five phases ran to `Done`.
    Completed(ShutdownReport),
    /// The watchdog forced the exit.
    Forced(ForceReason),
}

impl ShutdownOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownOutcome::Completed(_) => 0,
            ShutdownOutcome::Forced(_) => 1,
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, ShutdownOutcome::Forced(_))
    }
}

/// Races forced-exit triggers against the shutdown sequence.
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    overall_timeout: Duration,
}

impl Watchdog {
    pub fn new(overall_timeout: Duration) -> Self {
        Self { overall_timeout }
    }

    /// Block until the first termination request, then shut down.
    ///
    /// A closed signal channel counts as the first request.
    pub async fn supervise(
        &self,
        signals: &mut mpsc::Receiver<TerminationSignal>,
        sequencer: Arc<ShutdownSequencer>,
    ) -> ShutdownOutcome {
        match signals.recv().await {
            Some(signal) => tracing::info!(signal = %signal, "Starting graceful shutdown"),
            None => tracing::warn!("Signal source closed, starting graceful shutdown"),
        }

        let mut sequence = tokio::spawn({
            let sequencer = Arc::clone(&sequencer);
            async move { sequencer.run().await }
        });
        let deadline = tokio::time::sleep(self.overall_timeout);
        tokio::pin!(deadline);

        let outcome = tokio::select! {
            result = &mut sequence => match result {
                Ok(Some(report)) => ShutdownOutcome::Completed(report),
                Ok(None) => {
                    tracing::error!("Shutdown sequence was already triggered elsewhere");
                    ShutdownOutcome::Forced(ForceReason::SequencerFailed)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Shutdown sequence task failed");
                    ShutdownOutcome::Forced(ForceReason::SequencerFailed)
                }
            },
            Some(signal) = signals.recv() => {
                tracing::warn!(signal = %signal, "Second termination signal, forcing exit");
                ShutdownOutcome::Forced(ForceReason::SecondSignal(signal))
            }
            _ = &mut deadline => {
                tracing::warn!(
                    timeout_ms = self.overall_timeout.as_millis() as u64,
                    "Shutdown timed out, forcing exit"
                );
                ShutdownOutcome::Forced(ForceReason::Timeout(self.overall_timeout))
            }
        };

        if let ShutdownOutcome::Forced(reason) = &outcome {
            sequencer.abandon();
            sequence.abort();
            metrics::record_forced(reason.as_str());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShutdownConfig;
    use crate::lifecycle::callbacks::{shutdown_callback, CallbackRegistry};
    use crate::lifecycle::shutdown::{ReleaseHook, ShutdownPhase};

    fn sequencer(config: ShutdownConfig, callbacks: CallbackRegistry) -> Arc<ShutdownSequencer> {
        Arc::new(ShutdownSequencer::new(Vec::new(), callbacks, Vec::new(), config))
    }

    fn fast() -> ShutdownConfig {
        ShutdownConfig {
            drain_wait_ms: 0,
            callback_timeout_ms: 0,
            release_pause_ms: 0,
            ..ShutdownConfig::default()
        }
    }

    #[test]
    fn test_exit_codes() {
        let report = ShutdownReport {
            servers_stopped: 0,
            stop_failures: 0,
            callbacks_run: 0,
            elapsed: Duration::ZERO,
        };
        assert_eq!(ShutdownOutcome::Completed(report).exit_code(), 0);
        assert_eq!(
            ShutdownOutcome::Forced(ForceReason::Timeout(Duration::from_secs(1))).exit_code(),
            1
        );
    }

    #[tokio::test]
    async fn test_clean_shutdown_completes() {
        let (tx, mut rx) = mpsc::channel(2);
        tx.send(TerminationSignal::Terminate).await.unwrap();

        let seq = sequencer(fast(), CallbackRegistry::new());
        let outcome = Watchdog::new(Duration::from_secs(5)).supervise(&mut rx, seq.clone()).await;

        assert!(matches!(outcome, ShutdownOutcome::Completed(_)));
        assert_eq!(seq.phase(), ShutdownPhase::Done);
    }

    #[tokio::test]
    async fn test_overall_timeout_forces_exit() {
        let (tx, mut rx) = mpsc::channel(2);
        tx.send(TerminationSignal::Interrupt).await.unwrap();

        let mut callbacks = CallbackRegistry::new();
        callbacks.register(shutdown_callback(|_ctx| std::future::pending::<()>()));
        let seq = sequencer(fast(), callbacks);

        let outcome = Watchdog::new(Duration::from_millis(100))
            .supervise(&mut rx, seq.clone())
            .await;

        assert_eq!(
            outcome,
            ShutdownOutcome::Forced(ForceReason::Timeout(Duration::from_millis(100)))
        );
        assert_eq!(seq.phase(), ShutdownPhase::RunningCallbacks);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_forced_exit_stops_remaining_release_hooks() {
        let (tx, mut rx) = mpsc::channel(2);
        tx.send(TerminationSignal::Terminate).await.unwrap();

        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let hooks: Vec<ReleaseHook> = vec![
            Box::new({
                let log = log.clone();
                move || {
                    std::thread::sleep(Duration::from_millis(300));
                    log.lock().unwrap().push("hook1");
                }
            }),
            Box::new({
                let log = log.clone();
                move || log.lock().unwrap().push("hook2")
            }),
        ];
        let seq = Arc::new(ShutdownSequencer::new(Vec::new(), CallbackRegistry::new(), hooks, fast()));

        let outcome = Watchdog::new(Duration::from_millis(100))
            .supervise(&mut rx, seq.clone())
            .await;
        assert_eq!(
            outcome,
            ShutdownOutcome::Forced(ForceReason::Timeout(Duration::from_millis(100)))
        );
        assert!(seq.is_abandoned());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*log.lock().unwrap(), vec!["hook1"]);
        assert_ne!(seq.phase(), ShutdownPhase::Done);
    }

    #[tokio::test]
    async fn test_closed_channel_starts_shutdown() {
        let (tx, mut rx) = mpsc::channel::<TerminationSignal>(2);
        drop(tx);

        let outcome = Watchdog::new(Duration::from_secs(5))
            .supervise(&mut rx, sequencer(fast(), CallbackRegistry::new()))
            .await;
        assert_eq!(outcome.exit_code(), 0);
    }
}
