//! Fixed-size worker thread pool (component H).
//!
//! Workers pull `WorkItem`s off a shared `flume` queue — an MPMC channel
//! paired with `Runnable` rather than auto-scaling: this pool's worker count
//! is fixed at construction (N long-lived worker threads) rather than
//! grown/shrunk on demand.
//!
//! A thread-local marks which pool (if any) the current thread is a worker
//! of, so [`ThreadPool::enter`] can short-circuit when the awaiting
//! computation is already running on one of its own workers — entering a
//! pool from one of its own workers is a no-op.

use std::cell::Cell;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::error::RuntimeError;
use crate::policy::{InitialResume, ResumptionPolicy, Runnable};
use crate::task::{Task, channel};

enum WorkItem {
    Runnable(Runnable),
    Callable(Box<dyn FnOnce() + Send>),
    /// One poison pill per worker, pushed by `stop()` to wake a thread
    /// parked in `recv()` and have it exit the loop.
    Exit,
}

struct PoolInner {
    sender: flume::Sender<WorkItem>,
    receiver: flume::Receiver<WorkItem>,
    stopped: AtomicBool,
    id: usize,
    worker_count: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

thread_local! {
    static CURRENT_POOL: Cell<Option<usize>> = const { Cell::new(None) };
}

fn next_pool_id() -> usize {
    use std::sync::atomic::AtomicUsize;
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// A fixed-size pool of worker threads that run queued `Runnable`s and
/// detached closures.
#[derive(Clone)]
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl ThreadPool {
    /// Spawns `workers` long-lived OS threads, each draining the pool's
    /// shared work queue until [`stop`](Self::stop) is called.
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = flume::unbounded();
        let id = next_pool_id();
        let worker_count = workers.max(1);
        let inner = Arc::new(PoolInner {
            sender,
            receiver,
            stopped: AtomicBool::new(false),
            id,
            worker_count,
            workers: Mutex::new(Vec::with_capacity(worker_count)),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let receiver = inner.receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("weave-pool-{id}-{worker_index}"))
                .spawn(move || {
                    CURRENT_POOL.with(|cell| cell.set(Some(id)));
                    worker_loop(receiver);
                })
                .expect("failed to spawn thread pool worker");
            handles.push(handle);
        }
        *inner.workers.lock().unwrap() = handles;

        tracing::debug!(id, workers = worker_count, "thread pool started");
        Self { inner }
    }

    /// Sets the exit flag, drops every item still queued, wakes each worker
    /// with a poison pill and joins it — except the calling thread itself if
    /// it happens to be one of this pool's own workers, which would
    /// otherwise self-join and deadlock. Idempotent: a second call is a
    /// no-op.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut dropped = 0usize;
        while self.inner.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        for _ in 0..self.inner.worker_count {
            let _ = self.inner.sender.send(WorkItem::Exit);
        }
        tracing::debug!(id = self.inner.id, dropped, "thread pool stop requested");

        let handles = std::mem::take(&mut *self.inner.workers.lock().unwrap());
        let current = std::thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                // Dropping an unjoined `JoinHandle` detaches the thread.
                drop(handle);
            } else {
                let _ = handle.join();
            }
        }
    }

    /// Runs `f` on a worker and returns a [`Task`] resolving to its result.
    pub fn spawn<F, T>(&self, f: F) -> Task<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Clone + Send + 'static,
    {
        let (promise, task) = channel::<T>();
        let submitted = self.try_submit(WorkItem::Callable(Box::new(move || {
            let _ = promise.set_value(f());
        })));
        if submitted.is_err() {
            tracing::warn!(id = self.inner.id, "spawn on stopped thread pool dropped");
        }
        task
    }

    /// Runs `f` on a worker without tracking its result.
    pub fn spawn_detached<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.try_submit(WorkItem::Callable(Box::new(f)));
    }

    /// A future that suspends the caller and resumes it on one of this
    /// pool's workers — a no-op if the caller is already on one of them.
    pub fn enter(&self) -> impl Future<Output = ()> {
        let already_on_pool = CURRENT_POOL.with(|cell| cell.get() == Some(self.inner.id));
        let pool = self.clone();
        async move {
            if already_on_pool {
                return;
            }
            let (promise, task) = channel::<()>();
            let _ = pool.try_submit(WorkItem::Callable(Box::new(move || {
                let _ = promise.set_value(());
            })));
            let _ = task.join().await;
        }
    }

    /// A [`ResumptionPolicy`] that dispatches resumed computations onto this
    /// pool's workers.
    pub fn policy(&self) -> ThreadPoolPolicy {
        ThreadPoolPolicy(self.clone())
    }

    fn try_submit(&self, item: WorkItem) -> Result<(), RuntimeError> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(RuntimeError::NoDispatcherInitialized);
        }
        self.inner
            .sender
            .send(item)
            .map_err(|_| RuntimeError::HomeThreadEnded)
    }
}

fn worker_loop(receiver: flume::Receiver<WorkItem>) {
    while let Ok(item) = receiver.recv() {
        match item {
            WorkItem::Runnable(runnable) => {
                crate::executor::install_and_call(|| {
                    let _ = runnable.run();
                });
            }
            WorkItem::Callable(f) => f(),
            WorkItem::Exit => break,
        }
    }
}

/// [`ResumptionPolicy`] that hands resumed computations to a [`ThreadPool`].
#[derive(Clone)]
pub struct ThreadPoolPolicy(ThreadPool);

impl ResumptionPolicy for ThreadPoolPolicy {
    fn resume(&self, runnable: Runnable) {
        if CURRENT_POOL.with(|cell| cell.get() == Some(self.0.inner.id)) {
            // Already on one of this pool's workers: run inline instead of
            // round-tripping through the queue.
            let _ = runnable.run();
            return;
        }
        if self
            .0
            .try_submit(WorkItem::Runnable(runnable))
            .is_err()
        {
            tracing::warn!("resume onto stopped thread pool dropped");
        }
    }

    fn initial_awaiter(&self) -> InitialResume {
        InitialResume::Suspend
    }
}
