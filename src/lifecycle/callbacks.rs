//! Shutdown callback registry.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::lifecycle::context::ShutdownContext;

/// A user action run during the callback phase.
///
/// Callbacks report nothing back; a callback that fails handles its own error.
pub type ShutdownCallback = Arc<dyn Fn(ShutdownContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`ShutdownCallback`].
///
/// ```ignore
/// let cb = shutdown_callback(|ctx| async move {
///     tokio::select! {
///         _ = flush_queue() => {}
///         _ = ctx.cancelled() => tracing::warn!("flush cut short"),
///     }
/// });
/// ```
pub fn shutdown_callback<F, Fut>(f: F) -> ShutdownCallback
where
    F: Fn(ShutdownContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx| -> BoxFuture<'static, ()> { Box::pin(f(ctx)) })
}

/// Ordered list of shutdown callbacks.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: Vec<ShutdownCallback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: ShutdownCallback) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Callbacks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ShutdownCallback> {
        self.callbacks.iter()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.callbacks.len())
            .finish()
    }
}

impl Extend<ShutdownCallback> for CallbackRegistry {
    fn extend<I: IntoIterator<Item = ShutdownCallback>>(&mut self, iter: I) {
        self.callbacks.extend(iter);
    }
}
