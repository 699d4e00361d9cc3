//! Cross-cutting error taxonomy.
//!
//! Hot-path errors that are returned from the lock-free SPSC fast path
//! stay as small hand-rolled enums instead:
//! [`TrySendErr`](crate::spsc::TrySendErr) and
//! [`TryRecvError`](crate::spsc::TryRecvError), defined in
//! `crate::spsc::error`. Everything else — including the generalized MPMC
//! [`crate::channel::Channel`] — funnels through [`RuntimeError`].

use std::error::Error as StdError;
use std::fmt;

/// The runtime's error taxonomy.
#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    /// `value()`/`get_result()` called on a future that has not completed.
    #[error("value not ready: call was made on an unfinished future")]
    ValueNotReady,

    /// `Dispatcher::current()`/`await` called on a thread with no installed
    /// dispatcher.
    #[error("no dispatcher installed on this thread")]
    NoDispatcherInitialized,

    /// A computation bound to a dispatcher policy was resumed after that
    /// dispatcher's owning thread had already exited.
    #[error("dispatcher's owning thread has already ended")]
    HomeThreadEnded,

    /// A computation pending on a dispatcher or pool was resumed with a
    /// cancelled outcome because the dispatcher/pool shut down.
    #[error("awaited computation was cancelled by shutdown")]
    AwaitCancelled,

    /// A publisher subscriber polled after the publisher closed and the
    /// subscriber has drained every buffered value.
    #[error("no more values: stream has ended")]
    NoMoreValues,

    /// A publisher subscriber's lag exceeded the configured buffer bound.
    #[error("subscriber lagged past the buffer bound and can no longer catch up")]
    NoLongerAvailable,

    /// Every [`Promise`](crate::task::Promise) for a future was dropped
    /// without ever setting a value.
    #[error("broken promise: no value was ever produced")]
    BrokenPromise,

    /// A double-subscribe of the same waiter onto the same chain — this is
    /// a programming error, not a runtime condition.
    #[error("double await: this waiter is already linked elsewhere")]
    DoubleAwait,

    /// An exception produced inside a spawned computation, captured into
    /// its future's result cell and rethrown from `get_result`/`.await`.
    #[error("task failed: {0}")]
    Custom(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl RuntimeError {
    pub fn custom<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        RuntimeError::Custom(Box::new(err))
    }
}

/// A minimal string-only error, handy for tests and simple `spawn`
/// callers that don't want to define their own error type.
#[derive(Debug)]
pub struct Message(pub String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
