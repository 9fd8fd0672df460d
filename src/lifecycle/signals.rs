//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGINT/SIGTERM handlers
//! - Translate signals into termination requests on a buffered channel
//! - Let embedders and tests request termination without a real signal
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Channel holds more than one request so a second signal is never lost
//!   while the first is being acted on

use tokio::sync::mpsc;

/// Capacity of the termination request channel.
pub const SIGNAL_BUFFER: usize = 2;

/// A request to terminate the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl std::fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Cloneable handle for requesting termination programmatically.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<TerminationSignal>,
}

impl ShutdownHandle {
    /// Deliver a termination request.
    ///
    /// Returns `false` if the request could not be queued: the buffer is
    /// full or nothing is listening anymore.
    pub fn request(&self, signal: TerminationSignal) -> bool {
        self.tx.try_send(signal).is_ok()
    }
}

/// Source of termination requests.
pub struct SignalListener {
    tx: mpsc::Sender<TerminationSignal>,
    rx: mpsc::Receiver<TerminationSignal>,
}

impl SignalListener {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        Self { tx, rx }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.tx.clone(),
        }
    }

    /// Forward SIGINT and SIGTERM into this listener's channel.
    ///
    /// Handlers are registered before this returns, so a signal arriving
    /// afterwards is queued rather than killing the process.
    #[cfg(unix)]
    pub fn install_os_handlers(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let tx = self.tx.clone();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = sigint.recv() => TerminationSignal::Interrupt,
                    Some(()) = sigterm.recv() => TerminationSignal::Terminate,
                    else => break,
                };
                tracing::info!(signal = %received, "Termination signal received");
                if tx.send(received).await.is_err() {
                    break;
                }
            }
        });

        tracing::debug!("Signal handlers installed");
        Ok(())
    }

    /// Forward Ctrl+C into this listener's channel.
    #[cfg(not(unix))]
    pub fn install_os_handlers(&self) -> std::io::Result<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(signal = %TerminationSignal::Interrupt, "Termination signal received");
                if tx.send(TerminationSignal::Interrupt).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    /// Give up the sending side and keep only the receiver.
    ///
    /// The channel closes once every handle and OS forwarder is gone.
    pub fn into_receiver(self) -> mpsc::Receiver<TerminationSignal> {
        self.rx
    }
}

impl Default for SignalListener {
    fn default() -> Self {
        Self::new()
    }
}
