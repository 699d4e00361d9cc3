//! Resumption policy abstraction (component C).
//!
//! A resumption policy decides *where* a resumed computation runs. It is
//! realized here as the `schedule` closure that
//! [`async_task::spawn`](async_task::spawn) takes. `Runnable::run()`
//! performs one bounded poll step of the underlying future: that single step
//! is this crate's realization of symmetric transfer — stack depth never
//! grows with the length of an await chain, because every resume re-enters
//! through a policy's `resume`/`resume_handle` rather than recursing.

pub use async_task::Runnable;

/// What a freshly spawned computation should do before its first poll.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InitialResume {
    /// Poll immediately on the spawning stack.
    RunImmediately,
    /// Suspend; the policy's ordinary dispatch decides when the first poll
    /// happens.
    Suspend,
}

/// The resumption-policy trait. Implementors decide how a
/// woken [`Runnable`] gets its next `poll()` call.
pub trait ResumptionPolicy: Clone + Send + Sync + 'static {
    /// Dispatches `runnable` according to this policy. Must not block and
    /// must not throw.
    fn resume(&self, runnable: Runnable);

    /// Like [`resume`](Self::resume), but gives the policy the option to
    /// hand the runnable back so the *caller* runs it inline on the current
    /// stack — the symmetric-transfer fast path. Returning `None` means the
    /// policy has already dispatched it elsewhere.
    fn resume_handle(&self, runnable: Runnable) -> Option<Runnable> {
        self.resume(runnable);
        None
    }

    fn initial_awaiter(&self) -> InitialResume {
        InitialResume::Suspend
    }
}

/// Runs the resumed computation on the current stack. No re-entrancy
/// protection: suitable for pre-resolved futures, or for callers who
/// already manage their own stack depth.
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl ResumptionPolicy for Immediate {
    fn resume(&self, runnable: Runnable) {
        let _ = runnable.run();
    }

    fn resume_handle(&self, runnable: Runnable) -> Option<Runnable> {
        Some(runnable)
    }

    fn initial_awaiter(&self) -> InitialResume {
        InitialResume::RunImmediately
    }
}

/// Posts to the calling thread's [`crate::executor`] queue: prevents
/// unbounded resume-recursion by draining a thread-local FIFO instead of
/// calling straight back into `resume`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Queued;

impl ResumptionPolicy for Queued {
    fn resume(&self, runnable: Runnable) {
        crate::executor::resume(runnable);
    }
}

/// Spawns a fresh OS thread whose body drains a brand-new queued executor
/// seeded with exactly this one runnable.
#[derive(Clone, Copy, Debug, Default)]
pub struct Parallel;

impl ResumptionPolicy for Parallel {
    fn resume(&self, runnable: Runnable) {
        std::thread::Builder::new()
            .name("weave-parallel".into())
            .spawn(move || crate::executor::resume(runnable))
            .expect("failed to spawn parallel-policy thread");
    }
}

/// Targets a named [`crate::dispatcher::Dispatcher`], looked up lazily on
/// every resume so a policy built before that dispatcher exists still works
/// once it's installed.
///
/// Three outcomes per resume, per `crate::dispatcher::lookup`:
/// - the dispatcher is alive: the runnable is handed to its FIFO.
/// - it was installed once but its owning thread has since exited: the
///   runnable is dropped and a warning logged — there is no side channel to
///   deliver `HomeThreadEnded` into an opaque `Runnable` (see
///   `crate::dispatcher`'s module docs and `DESIGN.md`).
/// - it has never been installed yet: the runnable is parked in a
///   process-wide pending list, drained the next time a dispatcher installs
///   under that name.
#[derive(Clone)]
pub struct Dispatcher {
    name: std::sync::Arc<str>,
}

impl Dispatcher {
    pub fn new(name: impl Into<std::sync::Arc<str>>) -> Self {
        Self { name: name.into() }
    }
}

impl ResumptionPolicy for Dispatcher {
    fn resume(&self, runnable: Runnable) {
        match crate::dispatcher::lookup(&self.name) {
            crate::dispatcher::Lookup::Alive(dispatcher) => dispatcher.schedule(runnable),
            crate::dispatcher::Lookup::HomeThreadEnded => {
                tracing::warn!(name = %self.name, "resume onto ended dispatcher dropped");
            }
            crate::dispatcher::Lookup::NotYetInstalled => {
                crate::dispatcher::park_pending(self.name.clone(), runnable);
            }
        }
    }
}

pub use crate::pool::ThreadPoolPolicy as ThreadPool;
