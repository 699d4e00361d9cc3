//! Fair, lock-free-entry mutex (component E).
//!
//! Two chains: `requests` is the atomic lock-free LIFO that incoming
//! lockers CAS-push themselves onto, and
//! `queue` is a plain FIFO pointer chain owned exclusively by whoever
//! currently holds the lock. A distinguished `doorman` sentinel on
//! `requests` means "locked, no queued waiters yet" — the same tagged-
//! sentinel trick [`crate::waiter::WaitChain`] already uses for the task
//! future's `READY` tag, reused here with a different tag and a different
//! protocol on top (`tag::DOORMAN`).
//!
//! Unlike the broadcast primitives built on `publish_and_drain`, the mutex
//! never wants a sentinel to stop new arrivals from linking — a `doorman`
//! head must still accept more waiters underneath it — so it drives
//! [`WaitChain::push_unconditional`] instead of `subscribe`.

use std::cell::UnsafeCell;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::ptr;
use std::task::{Context, Poll};

use crate::waiter::{reverse, tag, WaitChain, WaitNode};

/// A mutex whose waiters queue in FIFO arrival order once contended.
pub struct Mutex<T> {
    requests: WaitChain,
    /// FIFO chain of waiters who lost the race and are queued behind the
    /// current owner. Only ever touched by whoever holds the lock.
    queue: UnsafeCell<*mut WaitNode>,
    data: UnsafeCell<T>,
}

// SAFETY: `data` is only reachable through a `MutexGuard`, which exists
// exactly while the lock is held; `queue` is only touched by the holder.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(data: T) -> Self {
        Self {
            requests: WaitChain::new(),
            queue: UnsafeCell::new(ptr::null_mut()),
            data: UnsafeCell::new(data),
        }
    }

    /// CAS `requests: null -> doorman`. Succeeds only when the lock is
    /// completely uncontended.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.requests
            .compare_exchange(ptr::null_mut(), WaitChain::sentinel_ptr(tag::DOORMAN))
            .ok()
            .map(|_| MutexGuard { mutex: self })
    }

    pub fn lock(&self) -> LockFuture<'_, T> {
        LockFuture {
            mutex: self,
            node: WaitNode::new(),
            state: LockState::Start,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// After CAS-pushing `self_node` and observing the prior head was
    /// `null`, `self_node` just became owner. Anyone who raced in above it
    /// concurrently is still only reachable through `requests`; capture and
    /// reverse them into `queue` before returning, rebuilding `queue` from
    /// any concurrent requests observed above `self`.
    fn become_owner(&self, self_node: &WaitNode) {
        let captured = self.requests.swap(WaitChain::sentinel_ptr(tag::DOORMAN));
        if !WaitChain::is_node(captured) {
            // Nobody raced in above us; requests is now doorman and queue
            // stays empty.
            return;
        }
        let (fifo_head, _fifo_tail) = reverse(captured);
        let self_ptr = self_node as *const WaitNode as *mut WaitNode;
        debug_assert_eq!(
            fifo_head, self_ptr,
            "self must be the oldest entry in the captured chain"
        );
        let rest = self_node.next_ptr();
        self_node.set_next(ptr::null_mut());
        unsafe {
            *self.queue.get() = rest;
        }
    }

    /// Releases the lock. Called exactly once, from [`MutexGuard::drop`].
    fn unlock(&self) {
        loop {
            let queue_head = unsafe { *self.queue.get() };
            if !queue_head.is_null() {
                let node = unsafe { &*queue_head };
                let next = node.next_ptr();
                unsafe {
                    *self.queue.get() = next;
                }
                node.set_next(ptr::null_mut());
                // Ownership transfers directly to this waiter: it must not
                // re-attempt the CAS when woken, just observe the flag.
                node.set_flag(true);
                node.wake();
                return;
            }

            match self
                .requests
                .compare_exchange(WaitChain::sentinel_ptr(tag::DOORMAN), ptr::null_mut())
            {
                Ok(_) => return,
                Err(_) => {
                    let captured = self.requests.swap(WaitChain::sentinel_ptr(tag::DOORMAN));
                    if !WaitChain::is_node(captured) {
                        // Raced with another unlock-time observer; nothing
                        // to drain, loop back and retry the empty CAS.
                        continue;
                    }
                    let (fifo_head, _) = reverse(captured);
                    unsafe {
                        *self.queue.get() = fifo_head;
                    }
                    // Fall through to the top of the loop, which will now
                    // find a non-empty queue and hand off to its head.
                }
            }
        }
    }
}

enum LockState {
    Start,
    Waiting,
}

/// The future returned by [`Mutex::lock`].
///
/// # Cancel Safety
///
/// Not cancel-safe once it has been polled and returned `Pending`: like
/// every future built on [`crate::waiter::WaitChain`], a linked node must
/// not be dropped before it is woken and unlinked (see the module docs on
/// `crate::waiter`).
pub struct LockFuture<'a, T> {
    mutex: &'a Mutex<T>,
    node: WaitNode,
    state: LockState,
}

impl<T> Unpin for LockFuture<'_, T> {}

impl<'a, T> Future for LockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.state {
            LockState::Start => {
                if let Some(guard) = this.mutex.try_lock() {
                    return Poll::Ready(guard);
                }
                let prev = this.mutex.requests.push_unconditional(&this.node, cx.waker());
                if prev.is_null() {
                    this.mutex.become_owner(&this.node);
                    return Poll::Ready(MutexGuard { mutex: this.mutex });
                }
                this.state = LockState::Waiting;
                Poll::Pending
            }
            LockState::Waiting => {
                if this.node.get_flag() {
                    Poll::Ready(MutexGuard { mutex: this.mutex })
                } else {
                    // Spurious poll before our wake fired; re-register.
                    this.node.set_waker(cx.waker());
                    Poll::Pending
                }
            }
        }
    }
}

/// RAII guard: derefs to `T`, releases the lock on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> MutexGuard<'a, T> {
    /// Exposes the mutex this guard locked, so code holding only a guard
    /// (e.g. [`crate::sync::condvar::Condvar::wait_while`]) can obtain a
    /// fresh [`LockFuture`] after dropping it.
    pub(crate) fn mutex(this: &Self) -> &'a Mutex<T> {
        this.mutex
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
