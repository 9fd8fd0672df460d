//! Managed axum server.
//!
//! # Responsibilities
//! - Collect routes before startup
//! - Bind the listener and serve until stopped
//! - Put the admission gate in front of every route
//! - Stop gracefully: stop accepting, wait for accepted connections
//!
//! # Design Decisions
//! - Route registration consumes `self`; once the server is shared with the
//!   orchestrator no more routes can be added
//! - Graceful shutdown is driven by a `CancellationToken`
//! - Serve state is published on a watch channel so `stop` can wait for the
//!   serve loop to actually return

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::{middleware, routing::MethodRouter, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::in_flight::InFlightTracker;
use crate::http::reject::{admission, AdmissionGate, RejectSwitch};
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::lifecycle::server::{Server, ServerError};

/// Lifecycle of the serve loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeState {
    /// Not started yet.
    Idle,
    /// Accepting connections.
    Serving,
    /// Serve loop returned.
    Stopped,
}

/// An HTTP listener managed by the orchestrator.
pub struct ManagedServer {
    name: Arc<str>,
    address: String,
    router: Mutex<Option<Router>>,
    gate: AdmissionGate,
    shutdown: CancellationToken,
    state: watch::Sender<ServeState>,
    local_addr: OnceLock<SocketAddr>,
}

impl ManagedServer {
    /// Create a server that will listen on `address` once started.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (state, _) = watch::channel(ServeState::Idle);
        Self {
            gate: AdmissionGate {
                server: Arc::clone(&name),
                switch: RejectSwitch::new(),
                tracker: InFlightTracker::new(),
            },
            name,
            address: address.into(),
            router: Mutex::new(Some(Router::new())),
            shutdown: CancellationToken::new(),
            state,
            local_addr: OnceLock::new(),
        }
    }

    /// Register a handler for `path`.
    pub fn route(self, path: &str, method_router: MethodRouter) -> Self {
        self.map_router(|router| router.route(path, method_router))
    }

    /// Merge a prebuilt router.
    pub fn merge(self, other: Router) -> Self {
        self.map_router(|router| router.merge(other))
    }

    fn map_router(mut self, f: impl FnOnce(Router) -> Router) -> Self {
        let slot = self.router.get_mut().unwrap_or_else(PoisonError::into_inner);
        *slot = slot.take().map(f);
        self
    }

    /// Configured listen address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Bound address, once listening. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn serve_state(&self) -> ServeState {
        *self.state.borrow()
    }

    pub fn is_rejecting(&self) -> bool {
        self.gate.switch.is_engaged()
    }

    fn take_router(&self) -> Option<Router> {
        self.router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Wrap the user routes with the admission gate and request-level layers.
    fn build_service(&self, router: Router) -> Router {
        router
            .layer(middleware::from_fn_with_state(self.gate.clone(), admission))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
            )
    }

    async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr: SocketAddr = self
            .address
            .parse()
            .map_err(|_| ServerError::InvalidAddress {
                name: self.name.to_string(),
                address: self.address.clone(),
            })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                name: self.name.to_string(),
                source,
            })?;

        if let Ok(local) = listener.local_addr() {
            let _ = self.local_addr.set(local);
        }
        Ok(listener)
    }
}

#[async_trait]
impl Server for ManagedServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), ServerError> {
        let router = self
            .take_router()
            .ok_or_else(|| ServerError::AlreadyStarted(self.name.to_string()))?;

        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.send_replace(ServeState::Stopped);
                return Err(e);
            }
        };

        tracing::info!(
            server = %self.name,
            address = ?self.local_addr(),
            "Server listening"
        );
        self.state.send_replace(ServeState::Serving);

        let result = axum::serve(listener, self.build_service(router))
            .with_graceful_shutdown(self.shutdown.clone().cancelled_owned())
            .await;
        self.state.send_replace(ServeState::Stopped);

        match result {
            Ok(()) if self.shutdown.is_cancelled() => Ok(()),
            Ok(()) => Err(ServerError::UnexpectedExit(self.name.to_string())),
            Err(source) => Err(ServerError::Serve {
                name: self.name.to_string(),
                source,
            }),
        }
    }

    fn reject_new_requests(&self) {
        self.gate.switch.engage();
        tracing::info!(server = %self.name, "Server rejecting new requests");
    }

    async fn stop(&self, timeout: Option<Duration>) -> Result<(), ServerError> {
        tracing::info!(server = %self.name, "Server closing");
        self.shutdown.cancel();

        let mut state = self.state.subscribe();
        if *state.borrow() == ServeState::Idle {
            return Ok(());
        }

        let stopped = async move {
            let _ = state.wait_for(|s| *s == ServeState::Stopped).await;
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, stopped)
                .await
                .map_err(|_| ServerError::StopTimeout {
                    name: self.name.to_string(),
                    timeout: limit,
                }),
            None => {
                stopped.await;
                Ok(())
            }
        }
    }

    fn in_flight(&self) -> u64 {
        self.gate.tracker.active()
    }
}

impl std::fmt::Debug for ManagedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedServer")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("state", &self.serve_state())
            .field("rejecting", &self.is_rejecting())
            .finish()
    }
}
