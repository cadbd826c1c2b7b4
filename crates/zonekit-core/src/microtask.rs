//! Host microtask queue
//!
//! Micro tasks that reach the root delegate without a scheduling primitive
//! land here. Nothing drains the queue automatically; the embedder calls
//! [`drain`] at the end of its turn, the way an event loop would.

use crate::error::TaskResult;
use crate::task::Task;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use tracing::{trace, warn};

thread_local! {
    static QUEUE: RefCell<VecDeque<Task>> = const { RefCell::new(VecDeque::new()) };
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

pub(crate) fn enqueue(task: Task) {
    QUEUE.with(|queue| queue.borrow_mut().push_back(task));
}

pub(crate) fn remove(task: &Task) {
    QUEUE.with(|queue| queue.borrow_mut().retain(|queued| queued != task));
}

/// Number of micro tasks waiting on this thread
pub fn pending() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

fn pop() -> Option<Task> {
    QUEUE.with(|queue| queue.borrow_mut().pop_front())
}

struct DrainGuard;

impl DrainGuard {
    fn acquire() -> Option<Self> {
        DRAINING.with(|flag| (!flag.replace(true)).then_some(DrainGuard))
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        DRAINING.with(|flag| flag.set(false));
    }
}

/// Run queued micro tasks until the queue is empty
///
/// Tasks enqueued while draining run in the same drain. Every task runs
/// even if an earlier one failed; the first failure is returned and later
/// ones are logged. Calling `drain` from inside a micro task is a no-op.
pub fn drain() -> TaskResult<usize> {
    let Some(_guard) = DrainGuard::acquire() else {
        return Ok(0);
    };

    let mut ran = 0;
    let mut first_error = None;
    while let Some(task) = pop() {
        ran += 1;
        if let Err(error) = task.invoke() {
            if first_error.is_none() {
                first_error = Some(error);
            } else {
                warn!(task = %task.id(), label = task.label(), %error, "micro task failed");
            }
        }
    }
    trace!(ran, "microtask queue drained");

    match first_error {
        Some(error) => Err(error),
        None => Ok(ran),
    }
}
