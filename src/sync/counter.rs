//! Semaphore-like counter (entity F.1).
//!
//! An atomic signed integer plus a [`WaitChain`]. Awaiters are ready iff
//! the count is `<= 0`; `decrement`/`set` drain the whole chain the moment
//! the count crosses into that range, the same publish-and-drain used by
//! the task future's completion.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::task::{Context, Poll};

use crate::waiter::{tag, Subscribed, WaitChain, WaitNode};

pub struct Counter {
    value: AtomicI64,
    chain: WaitChain,
}

impl Counter {
    pub fn new(initial: i64) -> Self {
        let chain = if initial <= 0 {
            WaitChain::with_sentinel(tag::READY)
        } else {
            WaitChain::new()
        };
        Self {
            value: AtomicI64::new(initial),
            chain,
        }
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn increment(&self, by: i64) -> i64 {
        let result = self.value.fetch_add(by, Ordering::AcqRel) + by;
        self.maybe_rearm(result);
        result
    }

    /// Decrements by `by`; if the result is `<= 0`, wakes every awaiter.
    pub fn decrement(&self, by: i64) -> i64 {
        let result = self.value.fetch_sub(by, Ordering::AcqRel) - by;
        if result <= 0 {
            self.chain.publish_and_drain(tag::READY);
        } else {
            self.maybe_rearm(result);
        }
        result
    }

    /// Sets the absolute value; if `<= 0`, wakes every awaiter.
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Release);
        if v <= 0 {
            self.chain.publish_and_drain(tag::READY);
        } else {
            self.maybe_rearm(v);
        }
    }

    /// A past drain leaves the chain parked on the `READY` sentinel so any
    /// waiter still subscribing observes "already ready" without a lock.
    /// Once the count is positive again that sentinel must be cleared so
    /// new waiters can link instead of short-circuiting forever. Best
    /// effort: if a concurrent drain or rearm wins the race, our CAS simply
    /// fails and leaves the chain in whichever valid state the winner left.
    fn maybe_rearm(&self, observed: i64) {
        if observed > 0 {
            let _ = self
                .chain
                .compare_exchange(WaitChain::sentinel_ptr(tag::READY), std::ptr::null_mut());
        }
    }

    /// Returns a future that resolves once the count is `<= 0`.
    pub fn wait(&self) -> CounterWait<'_> {
        CounterWait {
            counter: self,
            node: WaitNode::new(),
            linked: false,
        }
    }
}

/// # Cancel Safety
///
/// Not cancel-safe once linked (see `crate::waiter` module docs): must not
/// be dropped between a `Pending` return and its resolution.
pub struct CounterWait<'a> {
    counter: &'a Counter,
    node: WaitNode,
    linked: bool,
}

impl Unpin for CounterWait<'_> {}

impl Future for CounterWait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.counter.get() <= 0 {
            return Poll::Ready(());
        }
        if this.linked {
            // Already linked from a prior poll: re-subscribing would
            // CAS-push this same node a second time and could drop another
            // waiter linked beneath it from the chain (see `crate::waiter`
            // module docs). Just refresh the waker.
            this.node.set_waker(cx.waker());
            return Poll::Pending;
        }
        match this.counter.chain.subscribe(&this.node, cx.waker()) {
            Subscribed::AlreadySentinel(_) => {
                if this.counter.get() <= 0 {
                    Poll::Ready(())
                } else {
                    // Sentinel hasn't been rearmed yet after a concurrent
                    // increment; nothing got linked, so wake ourselves to
                    // retry rather than hang.
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
            Subscribed::Registered => {
                this.linked = true;
                // Do not resolve from here even if `get() <= 0` now holds:
                // this node is physically linked into the chain, and the
                // only safe way to unlink it is for an actual
                // `publish_and_drain` to walk past it (see `crate::waiter`
                // module docs). If the count already dropped to `<= 0`, the
                // `decrement`/`set` call that did it is guaranteed to reach
                // its own `publish_and_drain` momentarily (same call, no
                // other thread needed) and will drain us correctly then.
                Poll::Pending
            }
        }
    }
}
