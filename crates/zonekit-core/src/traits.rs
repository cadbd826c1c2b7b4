//! # Behavior Contracts
//!
//! The two seams an embedder plugs into:
//!
//! - [`ZoneSpec`]: the hook bundle attached to a zone. Every hook receives
//!   the parent [`ZoneDelegate`] and decides whether (and how) to call
//!   through to it. The default implementation of each hook simply
//!   delegates, so a spec only overrides what it cares about.
//! - [`SchedulingPrimitive`]: the underlying host mechanism (a timer wheel,
//!   an I/O reactor, a virtual clock) that eventually fires a task.
//!
//! ```text
//!   zone.run(f)
//!      │
//!      ▼
//!   spec(zone).on_invoke(parent, zone, target, f)
//!      │  wraps / observes, then
//!      ▼
//!   parent.invoke(target, f) ──▶ nearest ancestor spec ──▶ … ──▶ root: f()
//! ```

use crate::context::{Zone, ZoneOptions};
use crate::delegate::ZoneDelegate;
use crate::error::{TaskResult, ZoneResult};
use crate::task::{Task, TaskKind};

/// Outcome of offering an error to the `on_handle_error` chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// The error was dealt with; do not surface it to the caller
    Handled,
    /// Nobody claimed the error; surface it unchanged
    Propagate,
}

impl ErrorDisposition {
    /// Check if the error should be surfaced
    pub fn should_propagate(self) -> bool {
        matches!(self, Self::Propagate)
    }
}

/// Snapshot passed to `on_has_task` when a zone's outstanding work changes
/// between empty and non-empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HasTaskState {
    /// Zone still has pending micro tasks
    pub micro_task: bool,
    /// Zone still has pending one-shot or periodic tasks
    pub macro_task: bool,
    /// Kind of the task whose scheduling or completion caused the change
    pub change: TaskKind,
}

/// Hook bundle attached to a zone
///
/// # Chain Semantics
///
/// Hooks walk from the zone towards the root. `current` is the zone that
/// declared this spec; `target` is the zone the operation was requested on
/// (a descendant or `current` itself). Calling `parent.xxx(target, …)`
/// passes control to the next spec up the tree; the root performs the real
/// host operation.
///
/// `on_has_task` is the exception: it is a notification, not an
/// interception, and every zone receives its own notification when its
/// counts change. Its default therefore does nothing.
pub trait ZoneSpec {
    /// Intercept creation of a child zone
    fn on_fork(
        &self,
        parent: &ZoneDelegate,
        _current: &Zone,
        target: &Zone,
        options: ZoneOptions,
    ) -> Zone {
        parent.fork(target, options)
    }

    /// Wrap a synchronous invocation made through [`Zone::run`]
    fn on_invoke(
        &self,
        parent: &ZoneDelegate,
        _current: &Zone,
        target: &Zone,
        callback: &mut dyn FnMut() -> TaskResult,
    ) -> TaskResult {
        parent.invoke(target, callback)
    }

    /// Decide whether an error raised in `target` is handled
    fn on_handle_error(
        &self,
        parent: &ZoneDelegate,
        _current: &Zone,
        target: &Zone,
        error: &anyhow::Error,
    ) -> ErrorDisposition {
        parent.handle_error(target, error)
    }

    /// Intercept scheduling; may return a replacement task or reject
    fn on_schedule_task(
        &self,
        parent: &ZoneDelegate,
        _current: &Zone,
        target: &Zone,
        task: Task,
    ) -> ZoneResult<Task> {
        parent.schedule_task(target, task)
    }

    /// Wrap the execution of a task callback
    fn on_invoke_task(
        &self,
        parent: &ZoneDelegate,
        _current: &Zone,
        target: &Zone,
        task: &Task,
    ) -> TaskResult {
        parent.invoke_task(target, task)
    }

    /// Intercept cancellation
    fn on_cancel_task(
        &self,
        parent: &ZoneDelegate,
        _current: &Zone,
        target: &Zone,
        task: &Task,
    ) -> ZoneResult<()> {
        parent.cancel_task(target, task)
    }

    /// Observe `current` gaining its first, or losing its last, task of a
    /// category
    fn on_has_task(
        &self,
        _parent: &ZoneDelegate,
        _current: &Zone,
        _target: &Zone,
        _state: HasTaskState,
    ) {
    }
}

/// Underlying mechanism that fires tasks
///
/// The root delegate calls [`arm`](SchedulingPrimitive::arm) once a task
/// has survived the `on_schedule_task` chain; the primitive is expected to
/// call [`Task::invoke`] when it fires.
pub trait SchedulingPrimitive {
    /// Register the task with the host mechanism
    fn arm(&self, task: &Task) -> ZoneResult<()>;

    /// Remove the task from the host mechanism
    fn disarm(&self, task: &Task) -> ZoneResult<()> {
        Err(crate::error::ZoneError::NotCancellable {
            label: task.label().to_owned(),
        })
    }
}
