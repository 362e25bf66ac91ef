//! The bounded worker pool handler invocations are offloaded to: a fixed
//! set of named worker tasks draining a bounded
//! queue. When the queue is saturated, `submit` reports rejection
//! synchronously so the poll task can reply `Overloaded` without ever
//! blocking on the queue itself.
//!
//! The spec describes `core`/`max` thread counts with a 60s keep-alive for
//! elastic growth. Tokio tasks are cheap enough that elastic growth buys
//! little here; we run a fixed pool sized at `max` and note the
//! simplification in DESIGN.md rather than reimplement a growable native
//! thread pool on top of an async runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// `max`: number of worker tasks. `queue_capacity`: bounded queue depth
    /// before `submit` starts reporting rejection.
    pub fn new(name: &str, max: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut workers = Vec::with_capacity(max);
        for worker_id in 0..max {
            let rx = rx.clone();
            let worker_name = format!("{name}-worker-{worker_id}");
            workers.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match job {
                        Some(job) => {
                            tracing::trace!(worker = %worker_name, "executing job");
                            job.await;
                        }
                        None => return,
                    }
                }
            }));
        }
        Self { tx, workers }
    }

    /// Enqueue `job`. Returns `false` (never blocking) if the bounded queue
    /// is currently full — the caller maps that to an `Overloaded` reply.
    pub fn submit(&self, job: Job) -> bool {
        self.tx.try_send(job).is_ok()
    }

    /// Stop accepting new work and wait for queued/in-flight jobs to drain,
    /// up to `grace`. Used by `ServerEngine::close` so in-flight replies get
    /// a chance to go out before the transport closes.
    pub async fn shutdown(self, grace: std::time::Duration) {
        drop(self.tx);
        let _ = tokio::time::timeout(grace, futures_util::future::join_all(self.workers)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let pool = WorkerPool::new("test", 2, 8);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            assert!(pool.submit(Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn rejects_when_queue_is_saturated() {
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let pool = WorkerPool::new("test", 1, 1);

        // Occupy the single worker with a job that blocks until released.
        let mut rx = release_rx.clone();
        assert!(pool.submit(Box::pin(async move {
            let _ = rx.changed().await;
        })));

        // Fill the one-deep queue.
        assert!(pool.submit(Box::pin(async {})));

        // The pool is now busy (1 running + 1 queued); further submissions
        // are rejected rather than queued further or blocked on.
        assert!(!pool.submit(Box::pin(async {})));

        release_tx.send(true).unwrap();
        pool.shutdown(Duration::from_secs(1)).await;
    }
}
