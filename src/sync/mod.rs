//! Synchronization primitives built on [`crate::waiter`]: a mutex (entity
//! E) and a counter/condvar pair (entity F).

pub mod condvar;
pub mod counter;
pub mod mutex;

pub use condvar::Condvar;
pub use counter::Counter;
pub use mutex::{Mutex, MutexGuard};
