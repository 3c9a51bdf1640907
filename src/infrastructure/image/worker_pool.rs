//! Bounded pool for fetch tasks.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Default maximum concurrent fetches.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Runs futures on a runtime with at most `max_concurrent` of them active.
///
/// Spawning never waits: each task acquires its permit after it has been
/// handed to the runtime.
#[derive(Debug, Clone)]
pub struct FetchPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl FetchPool {
    /// Creates a pool on `handle`.
    #[must_use]
    pub fn new(handle: Handle, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Spawns `task`; it starts once a permit is free.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let _permit = permits.acquire_owned().await.ok()?;
            Some(task.await)
        })
    }

    /// Number of tasks that could start right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Configured concurrency limit.
    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
