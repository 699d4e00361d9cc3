//! Single-consumer dispatcher loop (component G).
//!
//! A dispatcher owns a FIFO of ready [`Runnable`]s and a min-heap of timed
//! resumes, both behind one `Mutex` + `Condvar` pair — unlike
//! [`crate::waiter::WaitChain`], this primitive is not lock-free, because
//! it is single-consumer by design (only the owning thread ever pops) with
//! a blocking wait loop, matching `std::sync::Condvar` far more directly
//! than a CAS loop would.
//!
//! Dispatchers are looked up by name through a process-wide weak registry
//! so that a [`crate::policy::Dispatcher`] constructed on one thread
//! can target a
//! dispatcher installed on another, and so that a resume attempted after the
//! owning thread has exited observes [`RuntimeError::HomeThreadEnded`]
//! instead of silently hanging — the installing thread's `Dispatcher` handle
//! is held only by a thread-local, so when that thread exits and drops it,
//! `Weak::upgrade` on every other handle starts failing.

use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use std::task::Context;
use std::task::Poll;
use std::task::{Wake, Waker};
use std::time::{Duration, Instant};

use crate::policy::Runnable;

/// A timed entry in the dispatcher's min-heap, ordered by `deadline` (ties
/// broken by insertion order so same-deadline entries fire FIFO).
struct TimerEntry {
    deadline: Instant,
    seq: u64,
    job: TimerJob,
}

enum TimerJob {
    Runnable(Runnable),
    Sleep(Arc<SleepState>),
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want the earliest deadline on top, so
        // reverse the natural ordering.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct State {
    ready: VecDeque<Runnable>,
    timers: BinaryHeap<TimerEntry>,
    next_seq: u64,
    exited: bool,
}

struct DispatcherInner {
    state: Mutex<State>,
    cv: Condvar,
    name: Option<String>,
}

/// A per-thread loop that drives ready computations and timed resumes (spec
/// §3/§4.G). Cloning a `Dispatcher` is cheap and every clone refers to the
/// same underlying loop; the loop itself only ever runs on the thread that
/// called [`Dispatcher::install`] — `block_on`/`run_one` must be called from
/// that thread.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

thread_local! {
    static CURRENT: RefCell<Option<Dispatcher>> = const { RefCell::new(None) };
}

struct Registry {
    by_name: Mutex<HashMap<String, Weak<DispatcherInner>>>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        by_name: Mutex::new(HashMap::new()),
    })
}

/// Outcome of looking up a named dispatcher, per the two-phase install.
pub(crate) enum Lookup {
    Alive(Dispatcher),
    /// A dispatcher with this name was installed once but its owning thread
    /// has since exited.
    HomeThreadEnded,
    /// No dispatcher has ever been installed under this name yet.
    NotYetInstalled,
}

fn pending_registry() -> &'static Mutex<HashMap<String, Vec<Runnable>>> {
    static PENDING: OnceLock<Mutex<HashMap<String, Vec<Runnable>>>> = OnceLock::new();
    PENDING.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Parks `runnable` for the dispatcher named `name`, which has never been
/// installed yet. Drained the next time a dispatcher installs under that
/// name.
pub(crate) fn park_pending(name: Arc<str>, runnable: Runnable) {
    pending_registry()
        .lock()
        .unwrap()
        .entry(name.to_string())
        .or_default()
        .push(runnable);
}

pub(crate) fn lookup(name: &str) -> Lookup {
    let map = registry().by_name.lock().unwrap();
    match map.get(name) {
        Some(weak) => match weak.upgrade() {
            Some(inner) => Lookup::Alive(Dispatcher { inner }),
            None => Lookup::HomeThreadEnded,
        },
        None => Lookup::NotYetInstalled,
    }
}

impl Dispatcher {
    fn new(name: Option<String>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                state: Mutex::new(State {
                    ready: VecDeque::new(),
                    timers: BinaryHeap::new(),
                    next_seq: 0,
                    exited: false,
                }),
                cv: Condvar::new(),
                name,
            }),
        }
    }

    /// Installs the singleton dispatcher for the calling thread. Idempotent:
    /// subsequent calls on the same thread return the existing instance.
    pub fn install() -> Self {
        Self::install_named(None)
    }

    /// Like [`install`](Self::install), but also registers the dispatcher
    /// under `name` so other threads can target it through
    /// [`crate::policy::Dispatcher`].
    pub fn install_named(name: Option<&str>) -> Self {
        CURRENT.with(|cell| {
            if let Some(existing) = cell.borrow().as_ref() {
                return existing.clone();
            }
            let dispatcher = Self::new(name.map(str::to_owned));
            if let Some(name) = name {
                registry()
                    .by_name
                    .lock()
                    .unwrap()
                    .insert(name.to_owned(), Arc::downgrade(&dispatcher.inner));
            }
            tracing::debug!(name = ?name, "dispatcher installed");
            *cell.borrow_mut() = Some(dispatcher.clone());

            if let Some(name) = name {
                let pending = pending_registry().lock().unwrap().remove(name);
                if let Some(pending) = pending {
                    for runnable in pending {
                        dispatcher.schedule(runnable);
                    }
                }
            }

            dispatcher
        })
    }

    /// The dispatcher installed on the calling thread, if any.
    pub fn current() -> Option<Self> {
        CURRENT.with(|cell| cell.borrow().clone())
    }

    /// Appends `runnable` to the ready FIFO and wakes the loop.
    pub fn schedule(&self, runnable: Runnable) {
        let mut state = self.inner.state.lock().unwrap();
        state.ready.push_back(runnable);
        self.inner.cv.notify_one();
    }

    /// Inserts `runnable` into the timer heap for resumption no earlier than
    /// `deadline`.
    pub fn schedule_at(&self, runnable: Runnable, deadline: Instant) {
        let mut state = self.inner.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.timers.push(TimerEntry {
            deadline,
            seq,
            job: TimerJob::Runnable(runnable),
        });
        self.inner.cv.notify_one();
    }

    /// Returns a future that resolves no earlier than `deadline`, or with
    /// [`RuntimeError::HomeThreadEnded`](crate::error::RuntimeError::HomeThreadEnded)
    /// if the dispatcher is shut down first.
    pub fn sleep_until(&self, deadline: Instant) -> SleepFuture {
        SleepFuture {
            dispatcher: self.clone(),
            deadline,
            state: None,
        }
    }

    pub fn sleep_for(&self, duration: Duration) -> SleepFuture {
        self.sleep_until(Instant::now() + duration)
    }

    /// Drives this dispatcher's loop until `fut` resolves. Re-entrant: a
    /// computation already running on this dispatcher may call `block_on`
    /// again, nesting the loop.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        let mut fut = Box::pin(fut);
        let waker = Waker::from(Arc::new(ThreadPark(std::thread::current())));
        let mut cx = Context::from_waker(&waker);

        crate::executor::install_and_call(|| loop {
            if let Poll::Ready(value) = fut.as_mut().poll(&mut cx) {
                return value;
            }
            if !self.run_one(Duration::from_millis(20)) {
                std::thread::park_timeout(Duration::from_millis(5));
            }
        })
    }

    /// Runs a single iteration of the loop: fires the earliest-due timer,
    /// otherwise pops one ready item, otherwise blocks (up to `idle_wait`)
    /// for either. Returns `false` if nothing was available and the
    /// dispatcher has been shut down — signals callers like `block_on` to
    /// stop driving this loop.
    fn run_one(&self, idle_wait: Duration) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(deadline) = state.timers.peek().map(|e| e.deadline) {
                let now = Instant::now();
                if now >= deadline {
                    let entry = state.timers.pop().expect("peeked non-empty heap");
                    drop(state);
                    fire(entry.job);
                    return true;
                }
                if let Some(runnable) = state.ready.pop_front() {
                    drop(state);
                    let _ = runnable.run();
                    return true;
                }
                let (guard, _) = self
                    .inner
                    .cv
                    .wait_timeout(state, deadline.saturating_duration_since(now))
                    .unwrap();
                state = guard;
                continue;
            }
            if let Some(runnable) = state.ready.pop_front() {
                drop(state);
                let _ = runnable.run();
                return true;
            }
            if state.exited {
                return false;
            }
            let (guard, timeout) = self.inner.cv.wait_timeout(state, idle_wait).unwrap();
            state = guard;
            if timeout.timed_out() {
                return false;
            }
        }
    }

    /// Shuts this dispatcher down: every queued ready item and timer is
    /// drained. Sleep futures observe `HomeThreadEnded`; queued `Runnable`s
    /// are simply dropped, the accepted simplification recorded in
    /// `DESIGN.md` (an `async_task::Runnable` carries no side channel to
    /// inject an error into a still-pending future).
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.exited = true;
        let ready: Vec<_> = state.ready.drain(..).collect();
        let timers: Vec<_> = state.timers.drain().collect();
        drop(state);
        self.inner.cv.notify_all();
        tracing::debug!(
            name = ?self.inner.name,
            dropped_ready = ready.len(),
            dropped_timers = timers.len(),
            "dispatcher shut down"
        );
        drop(ready);
        for entry in timers {
            match entry.job {
                TimerJob::Runnable(_) => {}
                TimerJob::Sleep(state) => state.cancel(),
            }
        }
    }
}

impl Drop for DispatcherInner {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.exited {
            return;
        }
        state.exited = true;
        let timers: Vec<_> = state.timers.drain().collect();
        state.ready.clear();
        drop(state);
        for entry in timers {
            if let TimerJob::Sleep(s) = entry.job {
                s.cancel();
            }
        }
    }
}

fn fire(job: TimerJob) {
    match job {
        TimerJob::Runnable(r) => {
            let _ = r.run();
        }
        TimerJob::Sleep(state) => state.fire(),
    }
}

struct ThreadPark(std::thread::Thread);
impl Wake for ThreadPark {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }
    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}

struct SleepState {
    fired: AtomicBool,
    cancelled: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl SleepState {
    fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        if let Some(w) = self.waker.lock().unwrap().take() {
            w.wake();
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(w) = self.waker.lock().unwrap().take() {
            w.wake();
        }
    }
}

/// Future returned by [`Dispatcher::sleep_until`]/[`Dispatcher::sleep_for`].
pub struct SleepFuture {
    dispatcher: Dispatcher,
    deadline: Instant,
    state: Option<Arc<SleepState>>,
}

impl Unpin for SleepFuture {}

impl Future for SleepFuture {
    type Output = Result<(), crate::error::RuntimeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(state) = &this.state {
            if state.cancelled.load(Ordering::Acquire) {
                return Poll::Ready(Err(crate::error::RuntimeError::HomeThreadEnded));
            }
            if state.fired.load(Ordering::Acquire) {
                return Poll::Ready(Ok(()));
            }
            *state.waker.lock().unwrap() = Some(cx.waker().clone());
            return Poll::Pending;
        }

        if Instant::now() >= this.deadline {
            return Poll::Ready(Ok(()));
        }

        let state = Arc::new(SleepState {
            fired: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            waker: Mutex::new(Some(cx.waker().clone())),
        });

        let mut inner_state = this.dispatcher.inner.state.lock().unwrap();
        if inner_state.exited {
            return Poll::Ready(Err(crate::error::RuntimeError::HomeThreadEnded));
        }
        let seq = inner_state.next_seq;
        inner_state.next_seq += 1;
        inner_state.timers.push(TimerEntry {
            deadline: this.deadline,
            seq,
            job: TimerJob::Sleep(state.clone()),
        });
        drop(inner_state);
        this.dispatcher.inner.cv.notify_one();
        this.state = Some(state);
        Poll::Pending
    }
}
