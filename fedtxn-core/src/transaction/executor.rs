use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{Result, TransactionError};

/// Runs blocking finishing calls on a shared pool with a per-transaction cap.
#[derive(Clone)]
pub(crate) struct BoundedExecutor {
    pool: Handle,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl BoundedExecutor {
    pub(crate) fn new(pool: Handle, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            pool,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub(crate) fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Queue a blocking call; it starts once a permit is free.
    pub(crate) fn submit<F>(&self, task: F) -> JoinHandle<Result<()>>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.pool.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|_| {
                TransactionError::IllegalState("finishing executor is closed".to_string())
            })?;
            match tokio::task::spawn_blocking(task).await {
                Ok(result) => result,
                Err(err) => Err(TransactionError::IllegalState(format!(
                    "finishing task failed: {err}"
                ))),
            }
        })
    }

    /// Spawn an orchestration future on the pool; it runs detached from the caller.
    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<Result<()>>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.pool.spawn(future)
    }

    /// Submit every task at once and wait for all of them.
    pub(crate) async fn run_all<I, F>(&self, tasks: I) -> Vec<Result<()>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let handles: Vec<_> = tasks.into_iter().map(|task| self.submit(task)).collect();
        join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(err) => Err(TransactionError::IllegalState(format!(
                    "finishing task failed: {err}"
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn zero_concurrency_is_raised_to_one() {
        let executor = BoundedExecutor::new(Handle::current(), 0);
        assert_eq!(executor.max_concurrency(), 1);
    }

    #[tokio::test]
    async fn run_all_never_exceeds_the_cap() {
        let executor = BoundedExecutor::new(Handle::current(), 2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                move || {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .collect();

        let results = executor.run_all(tasks).await;
        assert_eq!(results.len(), 8);
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn task_errors_are_returned_per_task() {
        let executor = BoundedExecutor::new(Handle::current(), 4);
        let results = executor
            .run_all(vec![
                Box::new(|| Ok(())) as Box<dyn FnOnce() -> Result<()> + Send>,
                Box::new(|| Err(TransactionError::ReadOnlyViolation)),
            ])
            .await;
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(TransactionError::ReadOnlyViolation)
        ));
    }
}
