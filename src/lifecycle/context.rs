//! Deadline-bound cancellation context for shutdown callbacks.

use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Handed to every shutdown callback.
///
/// Carries an expiration time and a cancellation signal that fires when the
/// deadline passes or when the context is released. Cancellation is advisory:
/// nothing interrupts a callback that keeps running past its deadline.
#[derive(Debug, Clone)]
pub struct ShutdownContext {
    deadline: Instant,
    token: CancellationToken,
}

impl ShutdownContext {
    /// Create a context expiring `timeout` from now.
    ///
    /// Must be called inside a Tokio runtime: a timer task cancels the token
    /// at the deadline and exits early if the context is released first.
    pub fn with_timeout(timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let token = CancellationToken::new();

        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep_until(deadline) => timer.cancel(),
                _ = timer.cancelled() => {}
            }
        });

        Self { deadline, token }
    }

    /// When this context expires.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    /// Resolves once the deadline passes or the context is released.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = time::sleep_until(self.deadline) => {}
        }
    }

    /// A token for sub-tasks, cancelled together with this context.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Release the context; stops the timer task.
    pub(crate) fn release(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expires_at_deadline() {
        let ctx = ShutdownContext::with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_cancelled());
        assert!(ctx.remaining() <= Duration::from_millis(50));

        let start = Instant::now();
        ctx.cancelled().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_release_cancels_children() {
        let ctx = ShutdownContext::with_timeout(Duration::from_secs(60));
        let child = ctx.child_token();
        assert!(!child.is_cancelled());

        ctx.release();
        assert!(child.is_cancelled());
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_token_fires_at_deadline() {
        let ctx = ShutdownContext::with_timeout(Duration::from_millis(20));
        let child = ctx.child_token();
        tokio::time::timeout(Duration::from_secs(2), child.cancelled())
            .await
            .expect("child token should be cancelled by the timer");
    }

    #[tokio::test]
    async fn test_contexts_are_independent() {
        let a = ShutdownContext::with_timeout(Duration::from_secs(60));
        let b = ShutdownContext::with_timeout(Duration::from_secs(60));
        a.release();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }

    #[tokio::test]
    async fn test_zero_timeout_is_already_expired() {
        let ctx = ShutdownContext::with_timeout(Duration::ZERO);
        assert!(ctx.is_cancelled());
    }
}
