//! Shared utilities for shutdown integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shutdown_orchestrator::config::ShutdownConfig;
use shutdown_orchestrator::http::ManagedServer;
use shutdown_orchestrator::lifecycle::{Server, ServerError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Something observable that happened during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Reject(String),
    StopBegin(String),
    StopEnd(String),
    Callback(usize),
    Release,
}

/// Timestamped event log shared between mocks and the test body.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<Vec<(Instant, Event)>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.inner.lock().unwrap().push((Instant::now(), event));
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    /// When `event` was first recorded.
    pub fn time_of(&self, event: &Event) -> Option<Instant> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .find(|(_, e)| e == event)
            .map(|(t, _)| *t)
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

/// How a mock server's stop behaves.
#[derive(Debug, Clone, Copy)]
pub enum StopBehavior {
    Succeed,
    Fail,
    Hang,
    Delay(Duration),
}

/// In-memory server recording every lifecycle call.
pub struct MockServer {
    name: String,
    log: EventLog,
    stop_behavior: StopBehavior,
    fail_start: bool,
    rejecting: AtomicBool,
    stop_calls: AtomicUsize,
    closed: CancellationToken,
}

impl MockServer {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            stop_behavior: StopBehavior::Succeed,
            fail_start: false,
            rejecting: AtomicBool::new(false),
            stop_calls: AtomicUsize::new(0),
            closed: CancellationToken::new(),
        }
    }

    pub fn with_stop(mut self, behavior: StopBehavior) -> Self {
        self.stop_behavior = behavior;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn is_rejecting(&self) -> bool {
        self.rejecting.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Server for MockServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<(), ServerError> {
        if self.fail_start {
            return Err(ServerError::Other {
                name: self.name.clone(),
                message: "port already in use".into(),
            });
        }
        self.closed.cancelled().await;
        Ok(())
    }

    fn reject_new_requests(&self) {
        self.rejecting.store(true, Ordering::SeqCst);
        self.log.push(Event::Reject(self.name.clone()));
    }

    async fn stop(&self, timeout: Option<Duration>) -> Result<(), ServerError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(Event::StopBegin(self.name.clone()));

        let work = async {
            match self.stop_behavior {
                StopBehavior::Succeed => Ok(()),
                StopBehavior::Fail => Err(ServerError::Other {
                    name: self.name.clone(),
                    message: "listener refused to close".into(),
                }),
                StopBehavior::Hang => std::future::pending().await,
                StopBehavior::Delay(d) => {
                    tokio::time::sleep(d).await;
                    Ok(())
                }
            }
        };
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
                Err(ServerError::StopTimeout {
                    name: self.name.clone(),
                    timeout: limit,
                })
            }),
            None => work.await,
        };

        self.closed.cancel();
        self.log.push(Event::StopEnd(self.name.clone()));
        result
    }
}

/// Timing with every wait set to zero and a generous overall deadline.
pub fn instant_config() -> ShutdownConfig {
    ShutdownConfig {
        overall_timeout_ms: 10_000,
        drain_wait_ms: 0,
        callback_timeout_ms: 0,
        server_stop_timeout_ms: None,
        release_pause_ms: 0,
    }
}

/// Wait until a managed server has bound its listener.
pub async fn wait_listening(server: &ManagedServer) -> SocketAddr {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(addr) = server.local_addr() {
            return addr;
        }
        assert!(Instant::now() < deadline, "server never started listening");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
