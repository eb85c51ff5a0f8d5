//! Fixed-size worker pool
//!
//! Used by importers for CPU-heavy work such as glyph rasterization. The pool
//! wraps a rayon thread pool; [`WorkerPool::partition_mut`] splits a slice
//! across the workers with `par_chunks_mut` and blocks until every part is
//! done.

use crate::error::{AssetError, Result};
use crossbeam::channel::{self, Receiver};
use crossbeam::sync::WaitGroup;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Result of a job queued with [`WorkerPool::enqueue_with_result`]
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the job has run.
    ///
    /// Fails if the job was dropped by a stopped pool or panicked.
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|_| AssetError::PoolStopped)
    }

    /// Result if the job already ran
    pub fn try_get(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    // every queued job holds a clone; stop waits for all of them
    in_flight: Mutex<Option<WaitGroup>>,
    stopped: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `threads` workers, at least one
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("asset-worker-{index}"))
            .build()?;
        tracing::debug!("Started worker pool with {threads} threads");

        Ok(Self {
            pool,
            in_flight: Mutex::new(Some(WaitGroup::new())),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// One worker per available core
    pub fn with_available_parallelism() -> Result<Self> {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(threads)
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.send(Box::new(job))
    }

    pub fn enqueue_with_result<T, F>(&self, job: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = channel::bounded(1);
        self.send(Box::new(move || {
            let _ = sender.send(job());
        }))?;
        Ok(TaskHandle { receiver })
    }

    fn send(&self, job: Job) -> Result<()> {
        let in_flight = self.in_flight.lock();
        let Some(group) = in_flight.as_ref().filter(|_| !self.is_stopped()) else {
            return Err(AssetError::PoolStopped);
        };
        let group = group.clone();
        let stopped = self.stopped.clone();
        self.pool.spawn(move || {
            if !stopped.load(Ordering::Acquire)
                && panic::catch_unwind(AssertUnwindSafe(job)).is_err()
            {
                tracing::error!("Worker job panicked");
            }
            drop(group);
        });
        Ok(())
    }

    /// Run `f(chunk_index, offset, chunk)` over `thread_count()` disjoint
    /// chunks of `data` and wait for all of them.
    ///
    /// A panic in `f` is reported as [`AssetError::PoolStopped`].
    pub fn partition_mut<T, F>(&self, data: &mut [T], f: F) -> Result<()>
    where
        T: Send,
        F: Fn(usize, usize, &mut [T]) + Sync,
    {
        if self.is_stopped() {
            return Err(AssetError::PoolStopped);
        }
        if data.is_empty() {
            return Ok(());
        }
        let chunk_len = data.len().div_ceil(self.thread_count());

        let run = AssertUnwindSafe(|| {
            self.pool.install(|| {
                data.par_chunks_mut(chunk_len)
                    .enumerate()
                    .for_each(|(index, chunk)| f(index, index * chunk_len, chunk));
            })
        });
        panic::catch_unwind(run).map_err(|_| {
            tracing::error!("Partitioned job panicked");
            AssetError::PoolStopped
        })
    }

    /// Stop accepting jobs and wait for the running ones. Queued jobs are
    /// skipped.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let Some(group) = self.in_flight.lock().take() else {
            return;
        };
        // a job stopping its own pool cannot wait for itself
        if self.pool.current_thread_index().is_none() {
            group.wait();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("thread_count", &self.thread_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
