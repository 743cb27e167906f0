//! Blocking executor
//!
//! Bridges synchronous storage calls into async code. At most `pool_size`
//! closures run at once on tokio's blocking threads; at most
//! `queue_capacity` callers wait for a slot, anything beyond is rejected.

use super::error::{ServiceError, ServiceResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Clone)]
pub struct BlockingExecutor {
    permits: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    pool_size: usize,
    queue_capacity: usize,
}

/// Decrements the waiting counter however the wait ends (acquired or cancelled)
struct WaitSlot(Arc<AtomicUsize>);

impl Drop for WaitSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl BlockingExecutor {
    pub fn new(pool_size: usize, queue_capacity: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            waiting: Arc::new(AtomicUsize::new(0)),
            pool_size,
            queue_capacity,
        }
    }

    /// Callers currently queued for a worker slot
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Run `f` on the blocking pool and await its result
    ///
    /// The worker slot is held by the closure itself, so a caller that stops
    /// waiting (timeout, dropped request) does not free the slot before the
    /// storage call actually returns. No retries.
    pub async fn run<T, F>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce() -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.acquire().await?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        });

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                tracing::error!("Blocking storage call panicked");
                Err(ServiceError::Worker("storage call panicked".to_string()))
            }
            Err(e) => Err(ServiceError::Worker(e.to_string())),
        }
    }

    async fn acquire(&self) -> ServiceResult<OwnedSemaphorePermit> {
        if let Ok(permit) = self.permits.clone().try_acquire_owned() {
            return Ok(permit);
        }

        let queued = self.waiting.fetch_add(1, Ordering::AcqRel);
        let _slot = WaitSlot(self.waiting.clone());
        if queued >= self.queue_capacity {
            tracing::warn!(
                pool_size = self.pool_size,
                queue_capacity = self.queue_capacity,
                "Blocking pool saturated, rejecting call"
            );
            return Err(ServiceError::Rejected);
        }

        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServiceError::Worker("executor closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_result() {
        let executor = BlockingExecutor::new(2, 4);
        let value = executor.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);

        let err = executor
            .run::<(), _>(|| Err(ServiceError::CategoryNotFound("X".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CategoryNotFound(_)));
    }

    #[tokio::test]
    async fn test_panic_becomes_worker_error() {
        let executor = BlockingExecutor::new(1, 1);
        let err = executor
            .run::<(), _>(|| panic!("boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Worker(_)));

        // Slot is released after the panic
        assert_eq!(executor.run(|| Ok(1)).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rejects_beyond_queue_capacity() {
        let executor = BlockingExecutor::new(1, 1);
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Occupies the only worker slot until released
        let busy = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .run(move || {
                        let _ = release_rx.recv();
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Takes the single queue position
        let queued = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run(|| Ok("queued")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(executor.waiting(), 1);

        let err = executor.run(|| Ok("overflow")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected));

        release_tx.send(()).unwrap();
        busy.await.unwrap().unwrap();
        assert_eq!(queued.await.unwrap().unwrap(), "queued");
        assert_eq!(executor.waiting(), 0);
    }

    #[tokio::test]
    async fn test_zero_queue_rejects_when_busy() {
        let executor = BlockingExecutor::new(1, 0);
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let busy = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .run(move || {
                        let _ = release_rx.recv();
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            executor.run(|| Ok(())).await.unwrap_err(),
            ServiceError::Rejected
        ));

        release_tx.send(()).unwrap();
        busy.await.unwrap().unwrap();
    }
}
