//! Thread pool used for parallel query evaluation.

use core::fmt;
use rayon::prelude::*;

/// Parallel execution runtime using Rayon.
pub struct ParallelRuntime {
    /// Rayon thread pool
    pool: rayon::ThreadPool,
}

impl ParallelRuntime {
    /// Create a new parallel runtime with the specified number of threads.
    ///
    /// If `num_threads` is None, uses the number of CPU cores.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread pool cannot be created.
    pub fn new(num_threads: Option<usize>) -> anyhow::Result<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|index| format!("query-worker-{index}"));

        if let Some(num) = num_threads {
            builder = builder.num_threads(num);
        }

        let pool = builder.build()?;

        Ok(Self { pool })
    }

    /// Apply `execute` to every item on the pool, keeping input order.
    pub fn map<T, R, F>(&self, items: Vec<T>, execute: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        self.pool
            .install(|| items.into_par_iter().map(execute).collect())
    }

    /// Number of worker threads.
    #[inline]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl fmt::Debug for ParallelRuntime {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ParallelRuntime")
            .field("threads", &self.threads())
            .finish()
    }
}
