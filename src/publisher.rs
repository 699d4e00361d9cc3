//! Ring-buffer fan-out publisher (component I, publisher half).
//!
//! A single publisher feeds any number of independent subscribers, each
//! tracking its own cursor into a shared bounded history. Unlike
//! [`crate::channel::Channel`]'s "not empty"/"not full" gates — genuinely
//! shared boolean conditions, valid for every waiter at once — "does
//! subscriber N have a new item" is per-subscriber, so the wake-up chain
//! here is edge-triggered rather than level-triggered: every [`publish`]
//! resets the chain to idle after waking everyone, the same
//! `swap(null) + drain_lifo` [`crate::sync::condvar::Condvar::notify_all`]
//! uses, rather than [`crate::sync::counter::Counter`]'s persistent-sentinel
//! style. A subscriber that falls behind the buffer's retained window
//! observes [`RuntimeError::NoLongerAvailable`] and has its cursor snapped
//! forward to the oldest value still retained, mirroring
//! `tokio::sync::broadcast::Receiver::recv`'s `Lagged` recovery.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};

use crate::error::RuntimeError;
use crate::waiter::{Subscribed, WaitChain, WaitNode, drain_lifo, tag};

struct Inner<T> {
    /// Retained window of the last `capacity` published values, each
    /// reference-counted so every lagging-behind subscriber can still read
    /// it without `T: Clone`.
    buffer: Mutex<VecDeque<Arc<T>>>,
    capacity: usize,
    /// Position of `buffer.front()` — the oldest value still retained.
    base_position: AtomicU64,
    /// Position that will be assigned to the next published value.
    next_position: AtomicU64,
    closed: AtomicBool,
    chain: WaitChain,
    /// Bumped on every [`notify`](Inner::notify) sweep. Lets a `Next` that
    /// raced a publish between its fast-path check and its `subscribe` call
    /// detect the race and force its own redundant sweep rather than miss
    /// the wakeup until some later publish (see `Next::poll`).
    epoch: AtomicU64,
    /// One entry per live [`Subscription`] (registered in
    /// [`Publisher::subscribe`]/[`Subscription::clone`]), used only by
    /// [`Publisher::close_graciously`] to decide whether every subscriber
    /// has either caught up to the close point or detached.
    subscribers: Mutex<Vec<Weak<SubscriberState<T>>>>,
    /// Wakers registered by a pending [`CloseGraciously`] future, drained
    /// whenever a subscriber advances past the closed head or detaches.
    close_waiters: Mutex<Vec<Waker>>,
}

/// Per-subscriber shared cursor. Held as the real owner by exactly one
/// [`Subscription`] (cloning a `Subscription` mints a fresh, independent
/// cursor, matching the existing "each clone is its own independent
/// subscription" semantics) — `Weak` references to it in
/// `Inner::subscribers` are how [`Publisher::close_graciously`] observes
/// both live progress and detachment without the `Subscription` itself
/// needing to know about closing.
struct SubscriberState<T> {
    cursor: AtomicU64,
    inner: Weak<Inner<T>>,
}

impl<T> Drop for SubscriberState<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.wake_close_waiters();
        }
    }
}

/// Broadcasts values to any number of independent [`Subscription`]s, keeping
/// only the most recent `capacity` values.
pub struct Publisher<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Publisher<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "publisher capacity must be nonzero");
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                base_position: AtomicU64::new(0),
                next_position: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                chain: WaitChain::new(),
                epoch: AtomicU64::new(0),
                subscribers: Mutex::new(Vec::new()),
                close_waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Publishes `value`, evicting the oldest retained value if the buffer
    /// is already at capacity, and wakes every currently-waiting subscriber.
    pub fn publish(&self, value: T) {
        let mut buffer = self.inner.buffer.lock().unwrap();
        buffer.push_back(Arc::new(value));
        if buffer.len() > self.inner.capacity {
            buffer.pop_front();
            self.inner.base_position.fetch_add(1, Ordering::AcqRel);
        }
        drop(buffer);
        self.inner.next_position.fetch_add(1, Ordering::AcqRel);
        self.notify();
    }

    /// Marks the publisher closed and returns a future that resolves once
    /// every subscriber that was live at the moment of the call has either
    /// consumed every value published before closing, or detached.
    /// Subscribers caught up to the head observe
    /// [`RuntimeError::NoMoreValues`] from this call onward, same as before;
    /// awaiting the returned future is optional if the caller only cares
    /// about that visibility change and not about subscriber drain.
    pub fn close_graciously(&self) -> CloseGraciously<T> {
        self.inner.closed.store(true, Ordering::Release);
        self.notify();
        CloseGraciously {
            inner: self.inner.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Current publish position: the position the *next* published value
    /// will receive.
    pub fn position(&self) -> u64 {
        self.inner.next_position.load(Ordering::Acquire)
    }

    /// Creates a new subscriber starting at the oldest value still retained:
    /// a fresh subscriber may observe backlog, not only values published
    /// after it subscribes.
    pub fn subscribe(&self) -> Subscription<T> {
        let start = self.inner.base_position.load(Ordering::Acquire);
        Subscription {
            state: register_subscriber(&self.inner, start),
            inner: self.inner.clone(),
        }
    }

    fn notify(&self) {
        self.inner.notify();
    }
}

/// Registers a fresh [`SubscriberState`] starting at `cursor` in `inner`'s
/// registry and returns it, so [`Publisher::close_graciously`] can observe
/// this subscriber's progress and detachment.
fn register_subscriber<T>(inner: &Arc<Inner<T>>, cursor: u64) -> Arc<SubscriberState<T>> {
    let state = Arc::new(SubscriberState {
        cursor: AtomicU64::new(cursor),
        inner: Arc::downgrade(inner),
    });
    inner.subscribers.lock().unwrap().push(Arc::downgrade(&state));
    state
}

impl<T> Inner<T> {
    fn notify(&self) {
        let old = self.chain.swap(ptr::null_mut());
        self.epoch.fetch_add(1, Ordering::AcqRel);
        drain_lifo(old);
    }

    fn wake_close_waiters(&self) {
        let wakers: Vec<Waker> = std::mem::take(&mut *self.close_waiters.lock().unwrap());
        for w in wakers {
            w.wake();
        }
    }

    /// `true` iff every subscriber registered in `subscribers` has either
    /// consumed everything up to the current publish position, or detached
    /// (its `Weak` no longer upgrades). Also prunes dead entries so the
    /// registry doesn't grow unboundedly across a long-lived publisher's
    /// subscriber churn.
    fn all_subscribers_drained(&self) -> bool {
        let target = self.next_position.load(Ordering::Acquire);
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|weak| weak.upgrade().is_some());
        subscribers
            .iter()
            .all(|weak| match weak.upgrade() {
                Some(state) => state.cursor.load(Ordering::Acquire) >= target,
                None => true,
            })
    }
}

/// An independent read cursor over a [`Publisher`]'s history.
pub struct Subscription<T> {
    inner: Arc<Inner<T>>,
    state: Arc<SubscriberState<T>>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        // Each clone is an independent subscriber with its own cursor
        // (snapshotted from this one at clone time) and its own entry in
        // the close-tracking registry — dropping one clone does not affect
        // the others' contribution to `close_graciously`.
        let cursor = self.state.cursor.load(Ordering::Acquire);
        Self {
            state: register_subscriber(&self.inner, cursor),
            inner: self.inner.clone(),
        }
    }
}

enum TryNext<T> {
    Value(Arc<T>),
    Lagged,
    NotYet,
    Closed,
}

impl<T> Subscription<T> {
    /// This subscriber's next read position.
    pub fn position(&self) -> u64 {
        self.state.cursor.load(Ordering::Acquire)
    }

    fn try_next(&mut self) -> TryNext<T> {
        let base = self.inner.base_position.load(Ordering::Acquire);
        let mut cursor = self.state.cursor.load(Ordering::Acquire);
        if cursor < base {
            cursor = base;
            self.state.cursor.store(cursor, Ordering::Release);
            if self.inner.is_closed() {
                self.inner.wake_close_waiters();
            }
            return TryNext::Lagged;
        }
        let next = self.inner.next_position.load(Ordering::Acquire);
        if cursor >= next {
            return if self.inner.is_closed() {
                TryNext::Closed
            } else {
                TryNext::NotYet
            };
        }
        let buffer = self.inner.buffer.lock().unwrap();
        let index = (cursor - base) as usize;
        match buffer.get(index) {
            Some(value) => {
                let value = value.clone();
                drop(buffer);
                self.state.cursor.store(cursor + 1, Ordering::Release);
                if self.inner.is_closed() {
                    self.inner.wake_close_waiters();
                }
                TryNext::Value(value)
            }
            None => {
                // The value at our cursor was evicted between the two loads
                // above; resync to the current base and report it as a lag.
                drop(buffer);
                let resynced = self.inner.base_position.load(Ordering::Acquire);
                self.state.cursor.store(resynced, Ordering::Release);
                if self.inner.is_closed() {
                    self.inner.wake_close_waiters();
                }
                TryNext::Lagged
            }
        }
    }

    /// A future resolving to the next value, a lag error (cursor snapped
    /// forward to the oldest retained value), or closure.
    ///
    /// # Cancel safety
    /// Not cancel-safe once linked (see `crate::waiter` module docs).
    pub fn next(&mut self) -> Next<'_, T> {
        Next {
            subscription: self,
            node: WaitNode::new(),
            linked: false,
            resolved: false,
        }
    }
}

pub struct Next<'a, T> {
    subscription: &'a mut Subscription<T>,
    node: WaitNode,
    linked: bool,
    resolved: bool,
}

impl<T> Unpin for Next<'_, T> {}

impl<T> Drop for Next<'_, T> {
    fn drop(&mut self) {
        debug_assert!(
            !self.linked || self.resolved,
            "Next dropped while still linked and unresolved — see cancel-safety docs on crate::waiter"
        );
    }
}

impl<T> Future for Next<'_, T> {
    type Output = Result<Arc<T>, RuntimeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match this.subscription.try_next() {
            TryNext::Value(v) => {
                this.resolved = true;
                return Poll::Ready(Ok(v));
            }
            TryNext::Lagged => {
                this.resolved = true;
                return Poll::Ready(Err(RuntimeError::NoLongerAvailable));
            }
            TryNext::Closed => {
                this.resolved = true;
                return Poll::Ready(Err(RuntimeError::NoMoreValues));
            }
            TryNext::NotYet => {}
        }

        if this.linked {
            // Already linked from a prior poll: re-subscribing would
            // CAS-push this same node a second time onto the chain and
            // could drop another waiter linked beneath it (see
            // `crate::waiter` module docs). Just refresh the waker; the
            // epoch-recheck trick below only matters for the very first
            // link, since a subsequent `notify()` will drain this node like
            // any other.
            this.node.set_waker(cx.waker());
            return Poll::Pending;
        }

        let epoch_before = this.subscription.inner.epoch.load(Ordering::Acquire);
        match this.subscription.inner.chain.subscribe(&this.node, cx.waker()) {
            Subscribed::Registered => {
                this.linked = true;
                // Cancel safety: this node is now linked into the chain, so
                // we must not resolve `Ready` here even if a value is
                // available — only an actual `notify()` sweep may unlink it
                // (see crate::waiter module docs, and the matching comment
                // in `channel.rs`'s `SendFut`/`RecvFut::poll`).
                //
                // The chain is edge-triggered (no persistent sentinel): a
                // `publish`/`close_graciously` that ran its full `notify()`
                // sweep between our fast-path check above and the
                // `subscribe` call just now would have swept an empty
                // chain and left nothing linked to wake us. Detect that
                // race via `epoch` (bumped on every sweep) and, if it
                // fired, force a second sweep ourselves — safe and
                // idempotent whether or not our node is still linked —
                // so our waker is invoked and we get re-polled promptly
                // instead of waiting for some later publish.
                let epoch_after = this.subscription.inner.epoch.load(Ordering::Acquire);
                if epoch_after != epoch_before {
                    this.subscription.inner.notify();
                }
                Poll::Pending
            }
            Subscribed::AlreadySentinel(_) => {
                unreachable!("publisher chain never holds a sentinel (edge-triggered broadcast)")
            }
        }
    }
}

/// The future returned by [`Publisher::close_graciously`]: resolves once
/// every subscriber live at the moment of the close has consumed every
/// value published before it, or detached.
pub struct CloseGraciously<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Unpin for CloseGraciously<T> {}

impl<T> Future for CloseGraciously<T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.inner.all_subscribers_drained() {
            return Poll::Ready(());
        }
        self.inner
            .close_waiters
            .lock()
            .unwrap()
            .push(cx.waker().clone());
        // Recheck after registering: a subscriber may have finished
        // draining between the check above and the push, in which case its
        // wake already fired into an empty waiter list and we'd otherwise
        // miss it.
        if self.inner.all_subscribers_drained() {
            return Poll::Ready(());
        }
        Poll::Pending
    }
}
