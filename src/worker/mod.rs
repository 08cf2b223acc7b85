//! Worker pool for offloading synchronous exception handlers.
//!
//! Synchronous handlers must not stall the cooperative scheduler, so the
//! dispatch wrapper pushes them onto a rayon pool and awaits the result over
//! a oneshot channel. The wrapper never sizes or configures the pool; it
//! uses the process-wide [`WorkerPool::shared`] instance.

use std::sync::{Arc, OnceLock};

use rayon::ThreadPool;
use tokio::sync::oneshot;

static SHARED: OnceLock<WorkerPool> = OnceLock::new();

/// Shared thread pool for blocking work.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .expect("failed to build worker thread pool");
        Self {
            pool: Arc::new(pool),
        }
    }

    /// The process-wide pool used for synchronous handler dispatch, created
    /// on first use with one thread per CPU.
    pub fn shared() -> &'static WorkerPool {
        SHARED.get_or_init(WorkerPool::default)
    }

    /// Run a blocking closure on the pool and await its result.
    pub async fn execute<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            let result = f();
            let _ = tx.send(result);
        });

        rx.await.expect("worker task panicked")
    }
}
