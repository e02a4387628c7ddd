// src/core/worker_pool.rs

//! A fixed-size worker pool that admits long-running session tasks.
//!
//! Each task is the entire lifetime of one client session, so the pool size is the
//! maximum number of simultaneously active sessions. Further tasks wait in strict
//! FIFO order until a worker becomes free. This is admission control for whole
//! sessions, not a per-message dispatcher.

use crate::core::ChatRelayError;
use crate::core::metrics;
use crate::core::state::StatsState;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A unit of work owned by the queue until a worker dequeues it.
pub type Task = Pin<Box<dyn Future<Output = Result<(), ChatRelayError>> + Send + 'static>>;

/// State shared between the pool handle and its workers.
struct PoolShared {
    queue: Mutex<VecDeque<Task>>,
    /// Wakes idle workers on enqueue and on shutdown.
    notify: Notify,
    stopped: AtomicBool,
    active: AtomicUsize,
    /// Mirrors `active` into the server statistics.
    stats: Arc<StatsState>,
}

/// A bounded pool of workers servicing a FIFO task queue.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    size: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("active", &self.active_count())
            .field("queued", &self.queue_len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl WorkerPool {
    /// Creates the pool and spawns `size` workers onto the current tokio runtime.
    pub fn new(size: usize) -> Result<Self, ChatRelayError> {
        Self::with_stats(size, Arc::new(StatsState::new()))
    }

    /// Like `new`, but keeps `stats.active_threads` equal to the number of busy
    /// workers.
    pub fn with_stats(size: usize, stats: Arc<StatsState>) -> Result<Self, ChatRelayError> {
        if size == 0 {
            return Err(ChatRelayError::InvalidPoolSize);
        }

        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            stats,
        });

        let workers = (0..size)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, shared.clone())))
            .collect();

        info!("Worker pool created with {} workers", size);
        Ok(Self {
            shared,
            size,
            workers: Mutex::new(workers),
        })
    }

    /// Queues a task. Fails once shutdown has begun.
    pub fn enqueue<F>(&self, task: F) -> Result<(), ChatRelayError>
    where
        F: Future<Output = Result<(), ChatRelayError>> + Send + 'static,
    {
        {
            let mut queue = self.shared.queue.lock();
            if self.shared.stopped.load(Ordering::Acquire) {
                return Err(ChatRelayError::PoolStopped);
            }
            queue.push_back(Box::pin(task));
            metrics::QUEUED_SESSIONS.set(queue.len() as f64);
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    /// The number of workers currently executing a task.
    pub fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// The number of tasks waiting for a free worker.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Stops admissions, lets the workers drain every queued task, and waits for
    /// all of them to exit. In-flight tasks are never cancelled.
    pub async fn shutdown(&self) {
        self.stop();

        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                error!("Worker terminated abnormally: {e:?}");
            }
        }
        info!("All workers terminated");
    }

    fn stop(&self) {
        {
            // Flip the flag under the queue lock so no enqueue can slip in behind it.
            let _queue = self.shared.queue.lock();
            self.shared.stopped.store(true, Ordering::Release);
        }
        self.shared.notify.notify_waiters();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers hold their own handle to the shared state; they finish the queue
        // and exit on their own.
        self.stop();
    }
}

async fn worker_loop(worker_id: usize, shared: Arc<PoolShared>) {
    while let Some(task) = next_task(&shared).await {
        shared.active.fetch_add(1, Ordering::AcqRel);
        shared.stats.increment_active_threads();
        metrics::ACTIVE_WORKERS.inc();

        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Worker {worker_id}: task failed: {e}"),
            Err(panic) => error!(
                "Worker {worker_id}: task panicked: {}",
                panic_message(panic.as_ref())
            ),
        }

        shared.active.fetch_sub(1, Ordering::AcqRel);
        shared.stats.decrement_active_threads();
        metrics::ACTIVE_WORKERS.dec();
    }
    debug!("Worker {worker_id} exiting");
}

/// Waits for the next queued task. Returns `None` once the pool is stopped and
/// the queue is empty.
async fn next_task(shared: &PoolShared) -> Option<Task> {
    loop {
        // Register as a waiter before inspecting the queue so a `notify_one` issued
        // between the check and the await reaches this worker. The registration
        // ends with this iteration, so a busy worker never holds a wakeup.
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let next = {
            let mut queue = shared.queue.lock();
            let task = queue.pop_front();
            metrics::QUEUED_SESSIONS.set(queue.len() as f64);
            task
        };

        match next {
            Some(task) => return Some(task),
            None if shared.stopped.load(Ordering::Acquire) => return None,
            None => notified.await,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
