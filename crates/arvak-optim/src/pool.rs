//! Execution backends for finite-difference tasks.
//!
//! A [`WorkerPool`] is built once by the caller and handed to the optimizer
//! by reference for the whole run. Dropping it shuts the worker threads
//! down, so every exit path releases the pool.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{OptimError, OptimResult};

/// Pool size used when none is configured.
pub const DEFAULT_POOL_SIZE: usize = 2;

/// Runs a batch of independent tasks and hands back every task with its result.
///
/// Results may be produced in any order internally; callers must match
/// them to tasks through the returned pairs, never by position.
pub trait Backend: Sync {
    /// Number of tasks that can run at the same time.
    fn size(&self) -> usize;

    /// Run `f` on every task and block until all are done.
    fn execute<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<(T, R)>
    where
        T: Send,
        R: Send,
        F: Fn(&T) -> R + Sync;
}

/// In-thread backend. Useful as a deterministic reference and for cheap objectives.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialBackend;

impl Backend for SerialBackend {
    fn size(&self) -> usize {
        1
    }

    fn execute<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<(T, R)>
    where
        T: Send,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        tasks
            .into_iter()
            .map(|task| {
                let result = f(&task);
                (task, result)
            })
            .collect()
    }
}

/// Fixed-size pool of worker threads.
pub struct WorkerPool {
    pool: ThreadPool,
    size: usize,
}

impl WorkerPool {
    /// Start a pool with `size` workers.
    pub fn new(size: usize) -> OptimResult<Self> {
        if size == 0 {
            return Err(OptimError::InvalidConfig(
                "worker pool size must be at least 1".into(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("arvak-optim-worker-{i}"))
            .build()?;
        tracing::debug!(size, "started worker pool");
        Ok(Self { pool, size })
    }

    /// Start a pool with [`DEFAULT_POOL_SIZE`] workers.
    pub fn with_default_size() -> OptimResult<Self> {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("size", &self.size).finish()
    }
}

impl Backend for WorkerPool {
    fn size(&self) -> usize {
        self.size
    }

    fn execute<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<(T, R)>
    where
        T: Send,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|task| {
                    let result = f(&task);
                    (task, result)
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(OptimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_size() {
        let pool = WorkerPool::with_default_size().unwrap();
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_every_task_paired_with_its_result() {
        let pool = WorkerPool::new(3).unwrap();
        let tasks: Vec<usize> = (0..64).collect();
        let results = pool.execute(tasks, |&i| i * i);

        assert_eq!(results.len(), 64);
        for (task, square) in results {
            assert_eq!(square, task * task);
        }
    }

    #[test]
    fn test_serial_backend_matches_pool() {
        let pool = WorkerPool::new(4).unwrap();
        let mut a = pool.execute((0..10).collect(), |&i: &i32| i - 5);
        let mut b = SerialBackend.execute((0..10).collect(), |&i: &i32| i - 5);
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }
}
