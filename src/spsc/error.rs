//! Hot-path, non-allocating channel errors.
//!
//! These stay hand-rolled instead of `thiserror`-derived: they are returned
//! from the lock-free `try_send`/`try_recv` fast path and must not pull the
//! derive machinery's `Display` formatting cost into a release build's hot
//! loop.

use std::fmt;

/// Returned by [`Sender::try_send`](crate::spsc::Sender::try_send).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrySendErr<T> {
    /// The buffer has no free slot; the value is handed back unchanged.
    Full(T),
    /// The receiver half has been dropped; the value is handed back
    /// unchanged.
    Disconnected(T),
}

impl<T> fmt::Display for TrySendErr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendErr::Full(_) => f.write_str("channel is full"),
            TrySendErr::Disconnected(_) => f.write_str("receiver has disconnected"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendErr<T> {}

/// Returned by [`Receiver::try_recv`](crate::spsc::Receiver::try_recv) when
/// the channel is empty *and* the sender has disconnected: there is no more
/// data and none will ever arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryRecvError;

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("channel is empty and sender has disconnected")
    }
}

impl std::error::Error for TryRecvError {}
