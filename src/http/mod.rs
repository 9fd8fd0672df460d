//! HTTP server wrapper.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (request ID)
//!     → trace layer
//!     → reject.rs (admission gate: 503 once rejecting, else track)
//!     → user routes
//! ```

pub mod in_flight;
pub mod reject;
pub mod request;
pub mod server;

pub use reject::{RejectSwitch, UNAVAILABLE_BODY};
pub use request::X_REQUEST_ID;
pub use server::{ManagedServer, ServeState};
