use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Shared pool for image downloads and storage commits.
///
/// With a limit, at most that many jobs run at once and the rest wait for a
/// permit inside their own task, so `spawn` never blocks the caller.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Option<Arc<Semaphore>>,
    limit: Option<usize>,
}

impl WorkerPool {
    /// `threads == 0` gives an unbounded pool.
    pub fn new(threads: usize) -> Self {
        if threads > 0 {
            tracing::info!("Creating worker pool limited to {} concurrent jobs", threads);
            Self {
                permits: Some(Arc::new(Semaphore::new(threads))),
                limit: Some(threads),
            }
        } else {
            tracing::info!("Creating unbounded worker pool");
            Self::unbounded()
        }
    }

    pub fn unbounded() -> Self {
        Self {
            permits: None,
            limit: None,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Run `job` on the pool. Resolves to `None` if the pool was closed first.
    pub fn spawn<F, T>(&self, job: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = match permits {
                Some(sem) => match sem.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return None,
                },
                None => None,
            };
            Some(job.await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_limit_caps_concurrency() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.limit(), Some(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                pool.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unbounded_runs_everything() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.limit(), None);
        let done = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let done = done.clone();
                pool.spawn(async move {
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 16);
    }
}
