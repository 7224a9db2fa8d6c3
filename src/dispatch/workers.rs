//! Rayon thread pool sizing for grid dispatch.

use rayon::ThreadPoolBuilder;

use crate::error::Result;

/// How many worker threads execute runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerPool {
    /// Number of worker threads. If 0, use the rayon default.
    pub workers: usize,
}

impl WorkerPool {
    pub fn with_workers(workers: usize) -> Self {
        Self { workers }
    }

    /// Runs `f` on a pool with this many workers. With zero workers `f` runs
    /// on the global rayon pool.
    ///
    /// # Errors
    ///
    /// Returns `SearchError::WorkerPool` if the pool cannot be built.
    pub fn install<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        if self.workers == 0 {
            Ok(f())
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .thread_name(|index| format!("harvest-search-{}", index))
                .build()?;
            Ok(pool.install(f))
        }
    }
}
