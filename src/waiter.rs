//! Intrusive, lock-free waiter chain (component A).
//!
//! Every synchronization primitive in this crate — the task future, the
//! mutex, the counter, the condition variable, the channel and the
//! publisher — is built on top of [`WaitChain`]: a single atomic pointer
//! that is either idle (`null`), the head of a LIFO list of linked
//! [`WaitNode`]s, or one of a small set of tagged sentinel values.
//!
//! ## Tagged sentinels
//!
//! A real pointer to a [`WaitNode`] is always at least 2-byte aligned
//! (the struct contains an `AtomicPtr`), so its low bit is always clear.
//! We use that low bit to distinguish a linked-list head from a sentinel:
//! odd values are sentinels carrying a small tag, even non-null values are
//! real node pointers, and `null` means idle. This lets a single chain type
//! serve both the future-style "one-shot READY broadcast" primitives and
//! the mutex's "doorman" protocol, which needs a different sentinel with
//! different meaning but the identical CAS-push mechanics.
//!
//! ## Cancel safety
//!
//! A future that has linked a [`WaitNode`] into a chain and returned
//! `Pending` is **not** safe to drop before it resumes: the chain holds a
//! raw pointer into the node's storage, and nothing walks the list to
//! unlink a node on drop. Only pre-start cancellation (before the first
//! poll links anything) and dispatcher/pool shutdown cancellation (which
//! resumes the waiter with a cancelled outcome instead of dropping it out
//! from under the chain) are supported. Every public future built on
//! `WaitChain` documents this restriction explicitly.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::task::Waker;

const TAG_BIT: usize = 1;

#[inline]
fn encode_sentinel(tag: usize) -> *mut WaitNode {
    (((tag << 1) | TAG_BIT) as usize) as *mut WaitNode
}

#[inline]
fn decode_sentinel(ptr: *mut WaitNode) -> Option<usize> {
    let addr = ptr as usize;
    if addr != 0 && addr & TAG_BIT == TAG_BIT {
        Some(addr >> 1)
    } else {
        None
    }
}

/// Well-known tags used by the primitives in this crate. Callers are free to
/// mint their own (the mutex's `doorman` does), as long as they stay
/// consistent within a single chain.
pub(crate) mod tag {
    pub const READY: usize = 1;
    pub const DISABLED: usize = 2;
    pub const DOORMAN: usize = 3;
}

/// An intrusive node linking an awaiting future into a [`WaitChain`].
///
/// Embedded by value inside the awaiting future (never boxed, never
/// allocated separately) — this is what makes `subscribe` allocation-free.
pub(crate) struct WaitNode {
    next: AtomicPtr<WaitNode>,
    waker: std::cell::UnsafeCell<Option<Waker>>,
    /// Scratch bit for primitives that need to attach a one-bit payload to a
    /// completed wait without a second allocation — the mutex uses it to
    /// mark "ownership already transferred, don't re-attempt the CAS".
    flag: AtomicBool,
}

// SAFETY: `waker` is only ever written by the node's owner before linking,
// and only ever taken by exactly one drainer after the node is unlinked by
// that same drain (its `next` is cleared first, which is the hand-off
// point). Two threads never touch `waker` concurrently.
unsafe impl Sync for WaitNode {}
unsafe impl Send for WaitNode {}

impl WaitNode {
    pub(crate) fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            waker: std::cell::UnsafeCell::new(None),
            flag: AtomicBool::new(false),
        }
    }

    /// Installs the waker that `wake()` will invoke. Must be called before
    /// the node is subscribed.
    pub(crate) fn set_waker(&self, waker: &Waker) {
        let slot = unsafe { &mut *self.waker.get() };
        match slot {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    fn take_waker(&self) -> Option<Waker> {
        unsafe { (*self.waker.get()).take() }
    }

    pub(crate) fn wake(&self) {
        if let Some(w) = self.take_waker() {
            w.wake();
        }
    }

    pub(crate) fn next_ptr(&self) -> *mut WaitNode {
        self.next.load(Ordering::Relaxed)
    }

    pub(crate) fn set_next(&self, next: *mut WaitNode) {
        self.next.store(next, Ordering::Relaxed);
    }

    pub(crate) fn set_flag(&self, value: bool) {
        self.flag.store(value, Ordering::Release);
    }

    pub(crate) fn get_flag(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Outcome of [`WaitChain::subscribe`].
pub(crate) enum Subscribed {
    /// Linked into the chain; the caller must wait to be resumed.
    Registered,
    /// The chain already held the sentinel with this tag; nothing was
    /// linked. The caller should consume the result immediately instead of
    /// waiting (the "already ready" fast path).
    AlreadySentinel(usize),
}

/// The atomic LIFO head of a waiter chain.
pub(crate) struct WaitChain {
    head: AtomicPtr<WaitNode>,
}

impl WaitChain {
    pub(crate) const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub(crate) const fn with_sentinel(tag: usize) -> Self {
        Self {
            head: AtomicPtr::new(encode_sentinel(tag)),
        }
    }

    /// `true` iff the head currently holds a sentinel (any tag).
    pub(crate) fn is_sentinel(&self) -> Option<usize> {
        decode_sentinel(self.head.load(Ordering::Acquire))
    }

    /// Links `node` onto the chain, or observes a sentinel without linking.
    ///
    /// `node` must outlive its presence in the chain (see module docs on
    /// cancel safety): nothing unlinks it except a future `publish_and_drain`.
    ///
    /// Release on the successful CAS pairs with Acquire on the producer's
    /// `publish_and_drain` exchange, so a waiter that observes "registered"
    /// later observes every write the producer made before publishing.
    pub(crate) fn subscribe(&self, node: &WaitNode, waker: &Waker) -> Subscribed {
        node.set_waker(waker);
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            if let Some(tag) = decode_sentinel(head) {
                return Subscribed::AlreadySentinel(tag);
            }
            node.next.store(head, Ordering::Relaxed);
            let node_ptr = node as *const WaitNode as *mut WaitNode;
            match self
                .head
                .compare_exchange_weak(head, node_ptr, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => return Subscribed::Registered,
                Err(actual) => head = actual,
            }
        }
    }

    /// Atomically replaces the chain head with the sentinel for `tag` and
    /// returns whatever was there before (a LIFO head, `null`, or another
    /// sentinel). This is "publish" without the drain — callers that need
    /// FIFO order (the mutex) do their own walk of the returned list.
    pub(crate) fn exchange_sentinel(&self, tag: usize) -> *mut WaitNode {
        self.head
            .swap(encode_sentinel(tag), Ordering::AcqRel)
    }

    /// `exchange_sentinel` followed by an immediate LIFO drain: every linked
    /// waiter is woken in an unspecified (LIFO) order. This is the
    /// "publish-and-drain" algorithm used by every primitive that
    /// broadcasts to all waiters at once (task future completion, counter
    /// reaching zero, condvar `notify_all`).
    pub(crate) fn publish_and_drain(&self, tag: usize) {
        let old = self.exchange_sentinel(tag);
        drain_lifo(old);
    }

    /// CAS-pushes `node` onto the chain unconditionally — unlike
    /// [`subscribe`](Self::subscribe), a sentinel head does *not* stop the
    /// link; it becomes `node`'s `next`. Returns whatever was previously at
    /// the head (`null`, a sentinel, or another node) so the caller can
    /// decide what that means. Used by the mutex, whose `doorman` sentinel
    /// means "locked, no queue yet" rather than "nothing more can link".
    pub(crate) fn push_unconditional(&self, node: &WaitNode, waker: &Waker) -> *mut WaitNode {
        node.set_waker(waker);
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            node.next.store(head, Ordering::Relaxed);
            let node_ptr = node as *const WaitNode as *mut WaitNode;
            match self
                .head
                .compare_exchange_weak(head, node_ptr, Ordering::Release, Ordering::Acquire)
            {
                Ok(prev) => return prev,
                Err(actual) => head = actual,
            }
        }
    }

    /// Compare-exchange escape hatch used by the mutex, which manages its
    /// own sentinel protocol (`doorman`) rather than the generic
    /// publish-and-drain above.
    pub(crate) fn compare_exchange(
        &self,
        current: *mut WaitNode,
        new: *mut WaitNode,
    ) -> Result<*mut WaitNode, *mut WaitNode> {
        self.head
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }

    pub(crate) fn swap(&self, new: *mut WaitNode) -> *mut WaitNode {
        self.head.swap(new, Ordering::AcqRel)
    }

    pub(crate) fn load(&self) -> *mut WaitNode {
        self.head.load(Ordering::Acquire)
    }

    pub(crate) const fn sentinel_ptr(tag: usize) -> *mut WaitNode {
        encode_sentinel(tag)
    }

    pub(crate) fn is_node(ptr: *mut WaitNode) -> bool {
        !ptr.is_null() && decode_sentinel(ptr).is_none()
    }
}

/// Walks a LIFO list captured by an `exchange`, clearing each node's `next`
/// field before waking it (so the node may be reused/relinked the instant
/// its waker runs) and reversing nothing — callers needing FIFO order must
/// reverse themselves, as the mutex does.
///
/// `head` may be a sentinel instead of a node list — `publish_and_drain`
/// hands this whatever `exchange_sentinel` captured, which is the prior
/// sentinel itself when the chain was already published. A sentinel carries
/// no linked waiters, so that case is a no-op rather than a walk.
pub(crate) fn drain_lifo(head: *mut WaitNode) {
    if !WaitChain::is_node(head) {
        return;
    }
    let mut head = head;
    while !head.is_null() {
        debug_assert!(
            decode_sentinel(head).is_none(),
            "drain_lifo must only be called with a real node list"
        );
        let node = unsafe { &*head };
        let next = node.next.swap(ptr::null_mut(), Ordering::Relaxed);
        node.wake();
        head = next;
    }
}

/// Reverses a LIFO node list into FIFO order, returning (first, last).
/// Used by the mutex to rebuild `queue` from `requests`.
///
/// `head`'s list may bottom out at a sentinel instead of `null` — the
/// mutex's `requests` chain is terminated by the `doorman` sentinel while
/// the lock is held, not by `null`, so a captured chain reads `node_k ->
/// ... -> node_1 -> doorman`. The walk stops at the first non-node pointer
/// (`null` or a sentinel) rather than dereferencing it, leaving the
/// reversed list's tail (`node_1`) with its `next` correctly overwritten to
/// `null` — the sentinel itself is simply not part of the returned chain.
pub(crate) fn reverse(mut head: *mut WaitNode) -> (*mut WaitNode, *mut WaitNode) {
    let last = head;
    let mut prev: *mut WaitNode = ptr::null_mut();
    while WaitChain::is_node(head) {
        let node = unsafe { &*head };
        let next = node.next.load(Ordering::Relaxed);
        node.next.store(prev, Ordering::Relaxed);
        prev = head;
        head = next;
    }
    (prev, last)
}
