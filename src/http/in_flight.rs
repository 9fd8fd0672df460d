//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests currently inside application handlers
//! - Give each tracked request a unique ID for tracing
//!
//! # Design Decisions
//! - Guard-based: the count drops even if a handler panics
//! - Purely informational; the drain phase does not wait on it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global atomic counter for request sequence numbers.
/// Relaxed ordering is enough since we only need uniqueness.
static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

/// Process-unique sequence number of a tracked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestSeq(u64);

impl RequestSeq {
    pub fn next() -> Self {
        Self(REQUEST_SEQ.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for RequestSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Counts requests being handled by one server.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request entering the handler. Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            active: Arc::clone(&self.active),
            seq: RequestSeq::next(),
        }
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }
}

/// Keeps a request counted while alive.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
    seq: RequestSeq,
}

impl InFlightGuard {
    pub fn seq(&self) -> RequestSeq {
        self.seq
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(request = %self.seq, "Request finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_seq_unique() {
        assert_ne!(RequestSeq::next(), RequestSeq::next());
    }

    #[test]
    fn test_tracker_counts() {
        let tracker = InFlightTracker::new();
        assert_eq!(tracker.active(), 0);

        let first = tracker.track();
        let second = tracker.track();
        assert_eq!(tracker.active(), 2);
        assert_ne!(first.seq(), second.seq());

        drop(first);
        assert_eq!(tracker.active(), 1);

        drop(second);
        assert_eq!(tracker.active(), 0);
    }

    #[test]
    fn test_seq_displays_with_prefix() {
        let seq = RequestSeq::next();
        assert!(seq.to_string().starts_with("req-"));
        assert_ne!(seq.to_string(), RequestSeq::next().to_string());
    }

    #[test]
    fn test_clones_share_the_count() {
        let tracker = InFlightTracker::new();
        let clone = tracker.clone();
        let _guard = clone.track();
        assert_eq!(tracker.active(), 1);
    }
}
