//! Request admission during shutdown.
//!
//! # Responsibilities
//! - Hold the one-way reject switch shared by all request tasks
//! - Short-circuit with 503 before routing once the switch is set
//! - Count admitted requests as in flight
//!
//! # Design Decisions
//! - Release store / acquire load: a request evaluated after
//!   `engage()` returns always sees the switch set
//! - Applied as the innermost layer over the whole router, including the
//!   fallback, so no handler runs for a rejected request

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::in_flight::InFlightTracker;
use crate::observability::metrics;

/// Body sent with every rejected request.
pub const UNAVAILABLE_BODY: &str = "service unavailable";

/// One-way switch that turns new requests away.
#[derive(Debug, Clone, Default)]
pub struct RejectSwitch {
    engaged: Arc<AtomicBool>,
}

impl RejectSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start rejecting. There is no way back.
    pub fn engage(&self) {
        self.engaged.store(true, Ordering::Release);
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}

/// State for the admission middleware.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    pub server: Arc<str>,
    pub switch: RejectSwitch,
    pub tracker: InFlightTracker,
}

/// Reject when the switch is set, otherwise track and forward.
pub async fn admission(
    State(gate): State<AdmissionGate>,
    request: Request,
    next: Next,
) -> Response {
    if gate.switch.is_engaged() {
        tracing::debug!(
            server = %gate.server,
            method = %request.method(),
            path = %request.uri().path(),
            "Rejecting request during shutdown"
        );
        metrics::record_rejected(&gate.server);
        return (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY).into_response();
    }

    let guard = gate.tracker.track();
    tracing::trace!(server = %gate.server, request = %guard.seq(), "Request admitted");
    let response = next.run(request).await;
    drop(guard);
    response
}
