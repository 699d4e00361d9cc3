//! Predicated condition variable (entity F.2).
//!
//! Waiters carry a predicate and a reference to the [`Mutex`] guarding the
//! data the predicate inspects — the same `wait_while`/`notify_one`/
//! `notify_all` shape as `std::sync::Condvar`, built on the same
//! [`WaitChain`] as every other primitive in this crate instead of the
//! standard library's OS-level condvar.
//!
//! One design worth calling out: a notifier could re-check a popped
//! waiter's predicate on its own side before deciding to resume or re-queue
//! it, temporarily releasing the caller's lock to do so safely. That dance
//! exists to avoid a needless wake when the predicate obviously still
//! fails, and to dodge a self-deadlock if resuming runs the waiter inline
//! on the notifier's own stack. This implementation pushes that recheck to
//! the waiter's own loop instead: `wait_while`'s "on resume, re-lock and
//! re-evaluate the predicate — on failure, re-link and re-suspend" already
//! guarantees correctness without it, and it's how `std::sync::Condvar`/
//! `tokio::sync::Notify` consumers are written in practice. Doing the
//! notifier-side prefilter generically would require type-erasing an
//! arbitrary `FnMut(&mut T) -> bool` into the intrusive node itself; not
//! worth it for an optimization the waiter-side retry already makes
//! optional. Recorded as an explicit simplification in `DESIGN.md`.
//!
//! `notify_all`'s LIFO wake order matches an unordered (LIFO-drain)
//! broadcast, same as every other `publish_and_drain` sweep in this crate.

use std::future::Future;
use std::pin::Pin;
use std::ptr;
use std::task::{Context, Poll};

use crate::sync::mutex::{LockFuture, Mutex, MutexGuard};
use crate::waiter::{drain_lifo, Subscribed, WaitChain, WaitNode};

pub struct Condvar {
    chain: WaitChain,
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            chain: WaitChain::new(),
        }
    }

    /// Releases `guard`, suspends until woken, re-acquires the mutex and
    /// re-evaluates `condition`; repeats while `condition` returns `true`.
    pub fn wait_while<'a, T, F>(
        &'a self,
        guard: MutexGuard<'a, T>,
        condition: F,
    ) -> WaitWhile<'a, T, F>
    where
        F: FnMut(&mut T) -> bool,
    {
        WaitWhile {
            condvar: self,
            condition,
            node: WaitNode::new(),
            state: WaitState::Holding(guard),
        }
    }

    /// Wakes the most recently queued waiter, if any. Order among waiters
    /// is unspecified (see module docs).
    pub fn notify_one(&self) {
        let mut head = self.chain.load();
        loop {
            if head.is_null() {
                return;
            }
            let node = unsafe { &*head };
            let next = node.next_ptr();
            match self.chain.compare_exchange(head, next) {
                Ok(_) => {
                    node.set_next(ptr::null_mut());
                    node.wake();
                    return;
                }
                Err(actual) => head = actual,
            }
        }
    }

    /// Wakes every currently queued waiter.
    pub fn notify_all(&self) {
        let old = self.chain.swap(ptr::null_mut());
        drain_lifo(old);
    }
}

enum WaitState<'a, T> {
    Holding(MutexGuard<'a, T>),
    Linked,
    Relocking(LockFuture<'a, T>),
}

/// # Cancel Safety
///
/// Not cancel-safe once linked into the condvar's chain (see `crate::waiter`
/// module docs): must not be dropped between a `Pending` return and the
/// resolution that follows it.
pub struct WaitWhile<'a, T, F> {
    condvar: &'a Condvar,
    condition: F,
    node: WaitNode,
    state: WaitState<'a, T>,
}

impl<T, F> Unpin for WaitWhile<'_, T, F> {}

impl<'a, T, F> Future for WaitWhile<'a, T, F>
where
    F: FnMut(&mut T) -> bool,
{
    type Output = MutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            let state = std::mem::replace(&mut this.state, WaitState::Linked);
            match state {
                WaitState::Holding(mut guard) => {
                    if !(this.condition)(&mut guard) {
                        return Poll::Ready(guard);
                    }
                    let mutex_lock = {
                        // Grab a fresh lock future from the same mutex
                        // before releasing our guard, so we don't need a
                        // separate `&Mutex<T>` field.
                        let mutex: &'a Mutex<T> = MutexGuard::mutex(&guard);
                        drop(guard);
                        mutex.lock()
                    };
                    match this.condvar.chain.subscribe(&this.node, cx.waker()) {
                        Subscribed::Registered => {}
                        Subscribed::AlreadySentinel(_) => {
                            unreachable!("condvar chain never holds a sentinel")
                        }
                    }
                    this.state = WaitState::Relocking(mutex_lock);
                    return Poll::Pending;
                }
                WaitState::Linked => {
                    // Placeholder only; real transitions always leave
                    // `Holding` or `Relocking` behind.
                    unreachable!("WaitWhile state machine never parks on Linked")
                }
                WaitState::Relocking(fut) => {
                    let mut fut = fut;
                    match Pin::new(&mut fut).poll(cx) {
                        Poll::Pending => {
                            this.state = WaitState::Relocking(fut);
                            return Poll::Pending;
                        }
                        Poll::Ready(guard) => {
                            this.state = WaitState::Holding(guard);
                            continue;
                        }
                    }
                }
            }
        }
    }
}
