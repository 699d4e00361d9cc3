//! `weave` — a stackless coroutine runtime: waiter chains, ref-counted task
//! futures, resumption policies, a per-thread queued executor, a mutex, a
//! counter/condvar pair, a named dispatcher with timers, a fixed-size
//! thread pool, a generalized MPMC channel and a ring-buffer fan-out
//! publisher, plus the lock-free SPSC ring buffer this crate started from.
//!
//! ## Module map
//!
//! | component | module | what it is |
//! |---|---|---|
//! | A | [`waiter`] | intrusive lock-free waiter chain, every other primitive's foundation |
//! | B | [`task`] | ref-counted, multi-waiter suspendable computation (`Task`/`Promise`) |
//! | C | [`policy`] | where a resumed computation runs (`ResumptionPolicy`) |
//! | D | [`executor`] | per-thread queued trampoline bounding resume-recursion depth |
//! | E | [`sync::mutex`] | fair async mutex |
//! | F | [`sync::counter`], [`sync::condvar`] | async semaphore-like counter, predicated condvar |
//! | G | [`dispatcher`] | single-consumer FIFO + timer-heap dispatcher, install/lookup by name |
//! | H | [`pool`] | fixed-size worker thread pool |
//! | I | [`channel`], [`publisher`] | generalized MPMC channel, ring-buffer fan-out publisher |
//! | — | [`spsc`] | the non-allocating single-producer/single-consumer ring buffer |
//!
//! [`error::RuntimeError`] is the cross-cutting error taxonomy; [`debug`] is
//! where an unobserved task exception gets reported instead of silently
//! dropped.

pub mod channel;
pub mod debug;
pub(crate) mod dispatcher;
pub mod error;
pub(crate) mod executor;
pub mod policy;
pub mod pool;
pub mod publisher;
pub(crate) mod ring;
pub mod spsc;
pub mod sync;
pub mod task;
pub(crate) mod waiter;

pub use channel::Channel;
pub use dispatcher::Dispatcher;
pub use error::{Message, Result, RuntimeError};
pub use pool::ThreadPool;
pub use publisher::{Publisher, Subscription};
pub use sync::{Condvar, Counter, Mutex, MutexGuard};
pub use task::{Promise, Task};
