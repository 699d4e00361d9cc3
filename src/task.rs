//! Task future: ref-counted, multi-waiter suspendable computation
//! (component B).
//!
//! `TaskInner<T>` is the hard part: a result cell plus a
//! [`WaitChain`](crate::waiter::WaitChain), published exactly once and
//! broadcast to every subscriber. Rust's `Result<T, E>` already *is* the
//! tagged union of `{unset, value, exception}` minus the `unset` state
//! (represented here by the chain not yet holding the `READY` sentinel) and
//! minus the consumed/unconsumed distinction (tracked separately as a
//! `processed` flag so the drop-time debug report still fires correctly). A
//! hand-rolled refcount packed into a status word is replaced by `Arc`'s own
//! strong count — see DESIGN.md Open Question 2 for why that is a faithful
//! substitution rather than a scope cut.
//!
//! `T: Clone` is required because, like a C++ `shared_future<T>`, every
//! subscriber observes its own copy of the produced value.

use std::cell::UnsafeCell;
use std::future::Future;
use std::mem::MaybeUninit;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use crate::error::RuntimeError;
use crate::policy::{InitialResume, ResumptionPolicy, Runnable};
use crate::waiter::{tag, Subscribed, WaitChain, WaitNode};

/// The value produced by a [`Task`]: either its result, or a shared
/// (cloneable) error — `RuntimeError` itself is not `Clone` because it can
/// wrap an arbitrary `Box<dyn Error>`, so completed tasks store it behind
/// an `Arc`.
pub type TaskOutput<T> = Result<T, Arc<RuntimeError>>;

struct TaskInner<T> {
    chain: WaitChain,
    claimed: AtomicBool,
    processed: AtomicBool,
    result: UnsafeCell<MaybeUninit<TaskOutput<T>>>,
}

// SAFETY: `result` is written at most once, by whichever caller wins the
// `claimed` CAS, strictly before `chain.publish_and_drain` makes it visible
// (release); every reader observes readiness via an acquire load first.
unsafe impl<T: Send> Sync for TaskInner<T> {}
unsafe impl<T: Send> Send for TaskInner<T> {}

impl<T> TaskInner<T> {
    fn new() -> Self {
        Self {
            chain: WaitChain::new(),
            claimed: AtomicBool::new(false),
            processed: AtomicBool::new(false),
            result: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    fn is_ready(&self) -> bool {
        self.chain.is_sentinel() == Some(tag::READY)
    }

    /// Publishes `value`, waking every currently-subscribed waiter.
    /// Returns `false` if something had already completed this task (spec
    /// §8 property 4: "at most once per future").
    fn complete(&self, value: TaskOutput<T>) -> bool {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        unsafe {
            (*self.result.get()).write(value);
        }
        self.chain.publish_and_drain(tag::READY);
        true
    }

    /// Reads a clone of the completed result. Caller must have already
    /// established `is_ready()` (or observed `Subscribed::AlreadySentinel`).
    fn read(&self) -> TaskOutput<T>
    where
        T: Clone,
    {
        self.processed.store(true, Ordering::Release);
        unsafe { (*self.result.get()).assume_init_ref().clone() }
    }
}

impl<T> Drop for TaskInner<T> {
    fn drop(&mut self) {
        if !self.is_ready() {
            // Nobody ever produced a value and nobody is waiting: nothing
            // to report, this is just an abandoned, never-started task.
            return;
        }
        if self.processed.load(Ordering::Acquire) {
            return;
        }
        let result = unsafe { (*self.result.get()).assume_init_ref() };
        if let Err(err) = result {
            crate::debug::report_unobserved(err.as_ref());
        }
    }
}

/// A ref-counted handle to a suspendable computation's result.
///
/// Cloning a `Task` is cheap (it clones an `Arc`) and every clone observes
/// the same produced value. Dropping the last clone before the computation
/// reaches its final suspend destroys the underlying state — in this port,
/// simply an `Arc` refcount hitting zero.
pub struct Task<T> {
    inner: Arc<TaskInner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Task<T> {
    /// Non-blocking: `true` iff the chain head is a sentinel.
    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    /// Returns the result if ready, without blocking or subscribing.
    pub fn peek(&self) -> Option<TaskOutput<T>> {
        self.inner.is_ready().then(|| self.inner.read())
    }

    /// Synchronous `get_result()`: fails with
    /// [`RuntimeError::ValueNotReady`] if the computation hasn't completed.
    pub fn get_result(&self) -> Result<TaskOutput<T>, RuntimeError> {
        if !self.inner.is_ready() {
            return Err(RuntimeError::ValueNotReady);
        }
        Ok(self.inner.read())
    }

    /// Returns a future that resolves to this task's output. Equivalent to
    /// `co_await` in spec terms; multiple independent calls (even from
    /// different threads) may each await the same `Task` concurrently.
    ///
    /// # Cancel safety
    /// Like every future built on [`WaitChain`], this future must not be
    /// dropped after it has returned `Pending` and before it resolves (see
    /// `crate::waiter` module docs). Dropping a `Task` clone that was never
    /// polled, or that already resolved, is always safe.
    pub fn join(&self) -> TaskJoin<'_, T> {
        TaskJoin {
            task: self,
            node: WaitNode::new(),
            linked: false,
        }
    }

    /// Blocks the current OS thread until the result is available (spec
    /// §4.B `sync_wait`): installs an internal waiter that unparks this
    /// thread, then parks.
    pub fn sync_wait(&self) -> TaskOutput<T> {
        if let Some(value) = self.peek() {
            return value;
        }

        struct ThreadWake(std::thread::Thread);
        impl Wake for ThreadWake {
            fn wake(self: Arc<Self>) {
                self.0.unpark();
            }
            fn wake_by_ref(self: &Arc<Self>) {
                self.0.unpark();
            }
        }

        let waker: Waker = Waker::from(Arc::new(ThreadWake(std::thread::current())));
        let mut cx = Context::from_waker(&waker);
        let mut fut = self.join();
        loop {
            match Pin::new(&mut fut).poll(&mut cx) {
                Poll::Ready(v) => return v,
                Poll::Pending => std::thread::park(),
            }
        }
    }
}

/// The future returned by [`Task::join`].
pub struct TaskJoin<'a, T> {
    task: &'a Task<T>,
    node: WaitNode,
    linked: bool,
}

/// Safe: not self-referential, same reasoning as every other future in this
/// crate built on a borrowed [`WaitNode`].
impl<T> Unpin for TaskJoin<'_, T> {}

impl<T> Drop for TaskJoin<'_, T> {
    fn drop(&mut self) {
        debug_assert!(
            !self.linked || self.task.inner.is_ready(),
            "TaskJoin dropped while still linked and unresolved — see cancel-safety docs on crate::waiter"
        );
    }
}

impl<T: Clone + Send + 'static> Future for TaskJoin<'_, T> {
    type Output = TaskOutput<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Not self-referential: safe to treat as plain &mut through Pin.
        let this = unsafe { self.get_unchecked_mut() };

        if this.task.inner.is_ready() {
            return Poll::Ready(this.task.inner.read());
        }

        if this.linked {
            // Already linked into the chain from a prior poll: re-subscribing
            // the same node would CAS-push it a second time, overwriting its
            // `next` and silently dropping whatever else was linked beneath
            // it (see `crate::waiter` module docs). Just refresh the waker
            // and keep waiting for the in-flight registration to be drained.
            this.node.set_waker(cx.waker());
            return Poll::Pending;
        }

        match this.task.inner.chain.subscribe(&this.node, cx.waker()) {
            Subscribed::Registered => {
                this.linked = true;
                Poll::Pending
            }
            Subscribed::AlreadySentinel(t) => {
                debug_assert_eq!(t, tag::READY);
                Poll::Ready(this.task.inner.read())
            }
        }
    }
}

/// The producer half of a future/promise pair. Multiple outstanding
/// `Promise`s for the same task act as a
/// count: only the *last* one dropping without a value produces
/// [`RuntimeError::BrokenPromise`].
pub struct Promise<T> {
    inner: Arc<TaskInner<T>>,
    refs: Arc<std::sync::atomic::AtomicUsize>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        self.refs.fetch_add(1, Ordering::AcqRel);
        Promise {
            inner: self.inner.clone(),
            refs: self.refs.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    pub fn set_value(self, value: T) -> Result<(), RuntimeError> {
        if self.inner.complete(Ok(value)) {
            Ok(())
        } else {
            Err(RuntimeError::ValueNotReady)
        }
    }

    pub fn set_exception(self, err: RuntimeError) -> Result<(), RuntimeError> {
        if self.inner.complete(Err(Arc::new(err))) {
            Ok(())
        } else {
            Err(RuntimeError::ValueNotReady)
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if self.refs.fetch_sub(1, Ordering::AcqRel) == 1 && !self.inner.is_ready() {
            let _ = self.inner.complete(Err(Arc::new(RuntimeError::BrokenPromise)));
        }
    }
}

/// Creates a future/promise pair: `promise` is the producer side, `task`
/// is the ref-counted consumer handle.
pub fn channel<T: Clone + Send + 'static>() -> (Promise<T>, Task<T>) {
    let inner = Arc::new(TaskInner::new());
    let refs = Arc::new(std::sync::atomic::AtomicUsize::new(1));
    (
        Promise {
            inner: inner.clone(),
            refs,
        },
        Task { inner },
    )
}

/// Spawns `fut` under `policy` and returns a ref-counted [`Task`] handle
/// for its eventual output.
///
/// The `schedule` closure handed to [`async_task::spawn`] *is* the
/// resumption policy's dispatch operation (see `crate::policy` module
/// docs); `runnable.schedule()`/`runnable.run()` realize the bounded
/// symmetric-transfer trampoline.
pub fn spawn<P, F>(policy: P, fut: F) -> Task<F::Output>
where
    P: ResumptionPolicy,
    F: Future + Send + 'static,
    F::Output: Clone + Send + 'static,
{
    let inner = Arc::new(TaskInner::<F::Output>::new());
    let driver_inner = inner.clone();
    let body = async move {
        let value = fut.await;
        driver_inner.complete(Ok(value));
    };

    let policy_for_schedule = policy.clone();
    let schedule = move |runnable: Runnable| policy_for_schedule.resume(runnable);
    let (runnable, driver) = async_task::spawn(body, schedule);
    driver.detach();

    match policy.initial_awaiter() {
        InitialResume::RunImmediately => {
            let _ = runnable.run();
        }
        InitialResume::Suspend => runnable.schedule(),
    }

    Task { inner }
}

/// Like [`spawn`], but for computations that can fail; the error is stored
/// as the task's `Err` result instead of the Rust panic/unwind path (spec
/// §7 "user exceptions ... stored in the future's result cell").
pub fn try_spawn<P, F, T, E>(policy: P, fut: F) -> Task<T>
where
    P: ResumptionPolicy,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Clone + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let inner = Arc::new(TaskInner::<T>::new());
    let driver_inner = inner.clone();
    let body = async move {
        match fut.await {
            Ok(value) => {
                driver_inner.complete(Ok(value));
            }
            Err(err) => {
                driver_inner.complete(Err(Arc::new(RuntimeError::custom(err))));
            }
        }
    };

    let policy_for_schedule = policy.clone();
    let schedule = move |runnable: Runnable| policy_for_schedule.resume(runnable);
    let (runnable, driver) = async_task::spawn(body, schedule);
    driver.detach();

    match policy.initial_awaiter() {
        InitialResume::RunImmediately => {
            let _ = runnable.run();
        }
        InitialResume::Suspend => runnable.schedule(),
    }

    Task { inner }
}
