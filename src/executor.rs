//! Per-thread queued executor (component D).
//!
//! A thread-local `{ queue: FIFO<Runnable>, depth: usize }`. `resume(h)`
//! pushes `h`; if nothing is currently draining on this thread it drains to
//! empty, otherwise it trusts the outer drain loop to reach `h` eventually.
//! This bounds stack depth for chains of futures that wake each other
//! synchronously (the thing [`crate::policy::Queued`] exists to prevent).
//!
//! `install_and_call` pushes a fresh, independent frame onto a per-thread
//! stack of frames so nested callers (e.g. a dispatcher loop re-entering
//! via its own `await`) get their own queue and depth counter rather than
//! sharing the outermost one. Grounded on the thread-local-singleton idiom
//! in `examples/other_examples/bafca009_rustcc-coroutine-rs__src-scheduler.rs.rs`
//! (`thread_local!(static SCHEDULER: ...)`), generalized to a stack of
//! frames, pushing a new executor onto a per-thread stack.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::policy::Runnable;

struct Frame {
    queue: RefCell<VecDeque<Runnable>>,
    depth: Cell<usize>,
}

impl Frame {
    fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            depth: Cell::new(0),
        }
    }
}

thread_local! {
    static STACK: RefCell<Vec<Rc<Frame>>> = RefCell::new(vec![Rc::new(Frame::new())]);
}

fn top() -> Rc<Frame> {
    STACK.with(|s| s.borrow().last().expect("frame stack never empty").clone())
}

/// Pushes `runnable` onto the current thread's queue, draining it to
/// completion if this is the outermost call on this frame.
pub(crate) fn resume(runnable: Runnable) {
    let frame = top();
    frame.queue.borrow_mut().push_back(runnable);

    if frame.depth.get() != 0 {
        // An outer call on this same frame is already draining; it will
        // reach this runnable in due course.
        return;
    }

    frame.depth.set(1);
    loop {
        let next = frame.queue.borrow_mut().pop_front();
        match next {
            Some(r) => {
                let _ = r.run();
            }
            None => break,
        }
    }
    frame.depth.set(0);
}

/// Runs `f` on a freshly installed, independent executor frame, draining
/// any work queued during `f` before returning. Used by the dispatcher to
/// isolate its own re-entrant `await` loop from whatever frame called it.
pub(crate) fn install_and_call<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    STACK.with(|s| s.borrow_mut().push(Rc::new(Frame::new())));
    let result = f();
    let frame = top();
    loop {
        let next = frame.queue.borrow_mut().pop_front();
        match next {
            Some(r) => {
                let _ = r.run();
            }
            None => break,
        }
    }
    STACK.with(|s| {
        s.borrow_mut().pop();
    });
    result
}

/// Current re-entrancy depth of this thread's innermost executor frame.
/// Exposed for the queued-executor-reentrancy test.
#[cfg(test)]
pub(crate) fn current_depth() -> usize {
    top().depth.get()
}
