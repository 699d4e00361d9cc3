//! Generalized multi-producer multi-consumer channel (component I, channel
//! half).
//!
//! Unlike [`crate::spsc`]'s const-generic ring buffer — the hot,
//! non-allocating single-producer/single-consumer path — this channel
//! supports any number of senders and receivers and is built
//! the same way this crate's other high-level sync types are: a
//! `Mutex`-protected `VecDeque`, gated by two [`WaitChain`]s ("not empty",
//! "not full") that persist a sentinel while their condition holds, exactly
//! like [`crate::sync::counter::Counter`] — demoting the sentinel back to
//! idle the instant the condition goes false again so the next waiter
//! actually links instead of short-circuiting.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use crate::error::RuntimeError;
use crate::waiter::{Subscribed, WaitChain, WaitNode, tag};

struct Inner<T> {
    queue: Mutex<VecDeque<T>>,
    /// `0` means unbounded; `not_full` is then never demoted from its
    /// initial READY sentinel.
    capacity: usize,
    closed: AtomicBool,
    not_empty: WaitChain,
    not_full: WaitChain,
}

/// Demotes `chain` from its READY sentinel back to idle iff `condition_now_false`.
/// Best effort: a concurrent demote/promote racing ahead of us just means our
/// CAS fails and we leave the chain in whatever valid state the winner left,
/// the same tolerance `Counter::maybe_rearm` documents.
fn demote_if(chain: &WaitChain, condition_now_false: bool) {
    if condition_now_false {
        let _ = chain.compare_exchange(WaitChain::sentinel_ptr(tag::READY), ptr::null_mut());
    }
}

/// A bounded or unbounded MPMC channel. Clone to share a handle between
/// producers and consumers; the last clone to drop does not auto-close the
/// channel (call [`Channel::close`] explicitly).
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Channel<T> {
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded channel needs capacity > 0; use unbounded() otherwise");
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                capacity,
                closed: AtomicBool::new(false),
                not_empty: WaitChain::new(),
                not_full: WaitChain::with_sentinel(tag::READY),
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                capacity: 0,
                closed: AtomicBool::new(false),
                not_empty: WaitChain::new(),
                not_full: WaitChain::with_sentinel(tag::READY),
            }),
        }
    }

    fn has_space(&self) -> bool {
        self.inner.capacity == 0 || self.inner.queue.lock().unwrap().len() < self.inner.capacity
    }

    fn has_item(&self) -> bool {
        !self.inner.queue.lock().unwrap().is_empty()
    }

    fn push(&self, value: T) {
        let mut queue = self.inner.queue.lock().unwrap();
        queue.push_back(value);
        let now_full = self.inner.capacity != 0 && queue.len() >= self.inner.capacity;
        drop(queue);
        self.inner.not_empty.publish_and_drain(tag::READY);
        demote_if(&self.inner.not_full, now_full);
    }

    fn pop(&self) -> Option<T> {
        let mut queue = self.inner.queue.lock().unwrap();
        let value = queue.pop_front()?;
        let now_empty = queue.is_empty();
        drop(queue);
        if self.inner.capacity != 0 {
            self.inner.not_full.publish_and_drain(tag::READY);
        }
        demote_if(&self.inner.not_empty, now_empty);
        Some(value)
    }

    /// Pushes `value` without waiting. Fails with
    /// [`RuntimeError::NoLongerAvailable`] if closed, or
    /// [`RuntimeError::ValueNotReady`] if full.
    pub fn try_send(&self, value: T) -> Result<(), RuntimeError> {
        if self.is_closed() {
            return Err(RuntimeError::NoLongerAvailable);
        }
        if !self.has_space() {
            return Err(RuntimeError::ValueNotReady);
        }
        self.push(value);
        Ok(())
    }

    /// Pops a value without waiting. Fails with
    /// [`RuntimeError::NoMoreValues`] if empty and closed, or
    /// [`RuntimeError::ValueNotReady`] if merely empty.
    pub fn try_recv(&self) -> Result<T, RuntimeError> {
        match self.pop() {
            Some(v) => Ok(v),
            None if self.is_closed() => Err(RuntimeError::NoMoreValues),
            None => Err(RuntimeError::ValueNotReady),
        }
    }

    /// A future that resolves once `value` has been enqueued, or the
    /// channel closes.
    ///
    /// # Cancel safety
    /// Not cancel-safe once linked (see `crate::waiter` module docs).
    pub fn send(&self, value: T) -> SendFut<'_, T> {
        SendFut {
            channel: self,
            node: WaitNode::new(),
            linked: false,
            resolved: false,
            value: Some(value),
        }
    }

    /// A future that resolves with the next value, or an error once the
    /// channel is closed and drained.
    ///
    /// # Cancel safety
    /// Not cancel-safe once linked (see `crate::waiter` module docs).
    pub fn recv(&self) -> RecvFut<'_, T> {
        RecvFut {
            channel: self,
            node: WaitNode::new(),
            linked: false,
            resolved: false,
        }
    }

    /// Marks the channel closed and wakes every pending sender and receiver
    /// so they can observe it.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.not_empty.publish_and_drain(tag::READY);
        self.inner.not_full.publish_and_drain(tag::READY);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// # Cancel Safety
/// Not cancel-safe once linked into the channel's `not_full` chain (see
/// `crate::waiter` module docs): must not be dropped between a `Pending`
/// return and the resolution that follows it.
pub struct SendFut<'a, T> {
    channel: &'a Channel<T>,
    node: WaitNode,
    linked: bool,
    resolved: bool,
    value: Option<T>,
}

impl<T> Unpin for SendFut<'_, T> {}

impl<T> Drop for SendFut<'_, T> {
    fn drop(&mut self) {
        debug_assert!(
            !self.linked || self.resolved,
            "SendFut dropped while still linked and unresolved"
        );
    }
}

impl<T> Future for SendFut<'_, T> {
    type Output = Result<(), RuntimeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.channel.is_closed() {
            this.resolved = true;
            return Poll::Ready(Err(RuntimeError::NoLongerAvailable));
        }
        if this.channel.has_space() {
            let value = this.value.take().expect("polled after completion");
            this.channel.push(value);
            this.resolved = true;
            return Poll::Ready(Ok(()));
        }
        if this.linked {
            // Already linked from a prior poll: re-subscribing would
            // CAS-push this same node a second time onto `not_full` and
            // could drop another waiter linked beneath it (see
            // `crate::waiter` module docs). Just refresh the waker.
            this.node.set_waker(cx.waker());
            return Poll::Pending;
        }

        match this.channel.inner.not_full.subscribe(&this.node, cx.waker()) {
            Subscribed::Registered => {
                // Do not resolve from here even if `has_space()` now holds:
                // this node is physically linked into `not_full`, and the
                // only safe way to unlink it is for an actual
                // `publish_and_drain` to walk past it. Because `not_full`
                // keeps a *persistent* READY sentinel while space exists
                // (unlike `crate::publisher`'s edge-triggered chain), any
                // condition flip we could have raced with either already
                // parked us under `AlreadySentinel` below instead, or will
                // drain us properly on its own next `pop()`/`close()`.
                this.linked = true;
                Poll::Pending
            }
            Subscribed::AlreadySentinel(_) => {
                if this.channel.has_space() && !this.channel.is_closed() {
                    let value = this.value.take().expect("polled after completion");
                    this.channel.push(value);
                    this.resolved = true;
                    Poll::Ready(Ok(()))
                } else if this.channel.is_closed() {
                    this.resolved = true;
                    Poll::Ready(Err(RuntimeError::NoLongerAvailable))
                } else {
                    // Lost a race with a concurrent demote; retry shortly.
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
        }
    }
}

/// # Cancel Safety
/// Not cancel-safe once linked into the channel's `not_empty` chain (see
/// `crate::waiter` module docs).
pub struct RecvFut<'a, T> {
    channel: &'a Channel<T>,
    node: WaitNode,
    linked: bool,
    resolved: bool,
}

impl<T> Unpin for RecvFut<'_, T> {}

impl<T> Drop for RecvFut<'_, T> {
    fn drop(&mut self) {
        debug_assert!(
            !self.linked || self.resolved,
            "RecvFut dropped while still linked and unresolved"
        );
    }
}

impl<T> Future for RecvFut<'_, T> {
    type Output = Result<T, RuntimeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(v) = this.channel.pop() {
            this.resolved = true;
            return Poll::Ready(Ok(v));
        }
        if this.channel.is_closed() {
            this.resolved = true;
            return Poll::Ready(Err(RuntimeError::NoMoreValues));
        }
        if this.linked {
            // Already linked from a prior poll: re-subscribing would
            // CAS-push this same node a second time onto `not_empty` and
            // could drop another waiter linked beneath it (see
            // `crate::waiter` module docs). Just refresh the waker.
            this.node.set_waker(cx.waker());
            return Poll::Pending;
        }

        match this.channel.inner.not_empty.subscribe(&this.node, cx.waker()) {
            Subscribed::Registered => {
                // See the matching comment in `SendFut::poll`: this node is
                // now linked into `not_empty`, so resolving here without an
                // actual drain walking past it would leave a dangling
                // pointer once this future drops. `not_empty` keeps a
                // persistent sentinel while nonempty, so any racing `push`
                // either parked us under `AlreadySentinel` instead or will
                // drain us on its own.
                this.linked = true;
                Poll::Pending
            }
            Subscribed::AlreadySentinel(_) => {
                if let Some(v) = this.channel.pop() {
                    this.resolved = true;
                    Poll::Ready(Ok(v))
                } else if this.channel.is_closed() {
                    this.resolved = true;
                    Poll::Ready(Err(RuntimeError::NoMoreValues))
                } else {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
        }
    }
}
