//! Pluggable execution of independent units of work.
//!
//! Both executors run units inside the current process, so every unit
//! shares the caller's caches. There is no cross-process executor: the
//! single-build guarantee of the composition cache only holds within one
//! address space.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::ExecutorError;

/// A boxed unit of work.
pub type Task<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Box a future as a [`Task`].
pub fn task<F, T>(future: F) -> Task<T>
where
    F: Future<Output = T> + Send + 'static,
{
    Box::pin(future)
}

/// Runs a batch of independent tasks.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Maximum number of tasks running at once.
    fn workers(&self) -> usize;

    /// Run every task to completion. Results are returned in input order.
    async fn execute<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Vec<Result<T, ExecutorError>>;
}

/// Runs tasks on the tokio runtime, at most `workers` at a time.
///
/// A panicking task is reported as [`ExecutorError::Panicked`] without
/// affecting the others.
#[derive(Clone)]
pub struct PoolExecutor {
    workers: usize,
    permits: Arc<Semaphore>,
}

impl PoolExecutor {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    /// One worker per available core.
    pub fn with_available_cores() -> Self {
        Self::new(available_cores())
    }
}

#[async_trait]
impl Executor for PoolExecutor {
    fn workers(&self) -> usize {
        self.workers
    }

    async fn execute<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Vec<Result<T, ExecutorError>> {
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let permits = self.permits.clone();
                tokio::spawn(async move {
                    // The semaphore is never closed
                    let _permit = permits.acquire_owned().await.ok();
                    task.await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.map_err(ExecutorError::from));
        }
        results
    }
}

/// Runs tasks one after another on the calling task.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

#[async_trait]
impl Executor for SerialExecutor {
    fn workers(&self) -> usize {
        1
    }

    async fn execute<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Vec<Result<T, ExecutorError>> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(Ok(task.await));
        }
        results
    }
}

/// Number of available cores, at least 1.
pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
