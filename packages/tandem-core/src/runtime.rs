//! Task spawning abstraction for runtime independence.
//!
//! This module provides a [`TaskSpawner`] trait that allows the core library
//! to spawn its background tasks (the session actor, the relay connection and
//! adapter tickers) without being tied to a specific runtime handle. Embedders
//! that own their own runtime supply their own spawner.

use std::future::Future;

/// Abstraction for spawning background tasks.
///
/// Implementations should ensure tasks are properly tracked and can complete
/// even if the spawner is dropped.
///
/// # Example
///
/// ```ignore
/// let spawner = TokioSpawner::current();
/// let session = bootstrap_session(&spawner, relay_url, config, deps)?;
/// ```
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    ///
    /// The task runs independently of the caller and will continue until
    /// completion. Cancellation is the task's own business (the session tasks
    /// watch a `CancellationToken`).
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
