//! C7: a bounded pool of execution slots that runs Pipe bodies off the
//! coordinator thread (spec.md §4.7).
//!
//! Spec.md describes a pool of worker *processes*. Rust closures cannot be
//! re-forked into a fresh process image the way a dynamically-typed
//! engine can re-import a module by name, and the spec's Non-goals already
//! exclude sandboxing/environment capture — the only reasons cross-process
//! isolation would matter here. This pool instead bounds concurrency with
//! a semaphore and runs each job on the blocking thread pool via
//! `tokio::task::spawn_blocking`, so a long-running or panicking Pipe body
//! never stalls the coordinator. A worker "crash" (panic) is observed as a
//! `PipeExecutionError`, matching the spec's contract that a worker crash
//! surfaces as Task failure without requiring real process isolation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rms_common::eyre;
use rms_common::tokio::{self, sync::Semaphore};
use rms_graph::{Error, Result};

#[derive(Clone)]
pub struct WorkerPool {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The configured number of concurrent execution slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `submit(task_spec) -> future` (spec.md §4.7): run `job` on a worker
    /// slot and await its result. Rejects new work once [`shutdown`] has
    /// been called, but does not interrupt jobs already running.
    pub async fn submit<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)?;

        match tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        {
            Ok(result) => result,
            Err(join_err) => Err(Error::PipeExecutionError(eyre::eyre!(
                "worker panicked: {join_err}"
            ))),
        }
    }

    /// Stop accepting new submissions. Already-running jobs run to
    /// completion (spec.md §5: user code is not interruptible in general).
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_job_and_returns_its_result() {
        let pool = WorkerPool::new(2);
        let result = pool.submit(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn bounds_concurrency_to_capacity() {
        let pool = WorkerPool::new(1);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                pool.submit(move || {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_submissions() {
        let pool = WorkerPool::new(1);
        pool.shutdown();
        let err = pool.submit(|| Ok(())).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn panicking_job_surfaces_as_pipe_execution_error() {
        let pool = WorkerPool::new(1);
        let err = pool
            .submit(|| -> Result<()> { panic!("boom") })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PipeExecutionError(_)));
    }
}
