//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Build App → install signal handlers → spawn every server's serve loop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → buffered termination request channel
//!
//! Watchdog (watchdog.rs):
//!     1st request → run sequence, race {2nd request, overall timeout}
//!
//! Shutdown (shutdown.rs):
//!     Reject → Drain → Stop servers → Callbacks → Release → Done
//! ```
//!
//! # Design Decisions
//! - Phases are strictly ordered; each fan-out phase has its own barrier
//! - Per-phase failures are logged and swallowed; shutdown always moves on
//! - Shutdown has a hard deadline: forced exit once it elapses

pub mod callbacks;
pub mod context;
pub mod server;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod watchdog;

pub use callbacks::{shutdown_callback, CallbackRegistry, ShutdownCallback};
pub use context::ShutdownContext;
pub use server::{Server, ServerError};
pub use shutdown::{ShutdownPhase, ShutdownReport, ShutdownSequencer};
pub use signals::{ShutdownHandle, SignalListener, TerminationSignal};
pub use startup::{App, AppBuilder, BuildError};
pub use watchdog::{ForceReason, ShutdownOutcome, Watchdog};
