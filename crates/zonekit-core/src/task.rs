//! # Task Lifecycle
//!
//! A [`Task`] is one tracked unit of deferred work. It remembers the zone
//! that was current when it was scheduled and moves through an explicit
//! state machine:
//!
//! ```text
//!                     ┌──────────── periodic re-arm ───────────┐
//!                     ▼                                        │
//! Scheduling ──▶ Scheduled ──▶ Running ──▶ Completed           │
//!     │              │            │   └────────────────────────┘
//!     ▼              ▼            ▼
//!  Rejected      Cancelled ◀── (self-cancel)
//! ```
//!
//! Every transition goes through [`Task::transition`], which refuses moves
//! that are not in the table above. A cancelled task can never reach
//! `Running`.

use crate::context::Zone;
use crate::error::{TaskResult, ZoneError, ZoneResult};
use crate::traits::SchedulingPrimitive;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Task identifier
///
/// Unique for the lifetime of the process; the virtual clock uses it to
/// find a queued task again when it is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Get the raw numeric ID
    #[inline(always)]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// What kind of deferred work a task represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Immediate work, drained before any timed work
    Micro,
    /// Fires at most once after a delay
    OneShot,
    /// Re-arms itself after each firing until cancelled
    Periodic,
}

impl TaskKind {
    /// Check if the task is timed work (one-shot or periodic)
    pub fn is_macro(self) -> bool {
        !matches!(self, Self::Micro)
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Micro => "microTask",
            Self::OneShot => "macroTask",
            Self::Periodic => "periodicTask",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Intercepted but not yet committed to an engine
    Scheduling,
    /// Registered with the host or virtual engine; cancellable
    Scheduled,
    /// Callback is executing with the owning zone current
    Running,
    /// One-shot work finished
    Completed,
    /// Cancelled before (or while) running
    Cancelled,
    /// Scheduling was refused by a hook or the host
    Rejected,
}

impl TaskState {
    /// Check if no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rejected)
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Scheduling => "scheduling",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scheduler-specific data attached to a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskData {
    /// Delay before the first firing; the interval for periodic tasks
    pub delay_ms: u64,
    /// Excluded from leak checks and drain termination
    pub untracked: bool,
}

impl TaskData {
    /// Data for a task due after `delay_ms`
    pub const fn delay(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            untracked: false,
        }
    }

    /// Mark the task as untracked
    pub const fn untracked(mut self) -> Self {
        self.untracked = true;
        self
    }
}

/// Boxed user callback; periodic tasks call it repeatedly
pub type TaskCallback = Box<dyn FnMut() -> TaskResult>;

/// Shared handle to a unit of deferred work
///
/// Cloning is cheap; all clones observe the same state. The zone that
/// created the task owns it logically, engines only hold clones while the
/// task is queued.
#[derive(Clone)]
pub struct Task(Rc<TaskInner>);

struct TaskInner {
    id: TaskId,
    kind: TaskKind,
    label: String,
    zone: Zone,
    data: TaskData,
    state: Cell<TaskState>,
    run_count: Cell<u64>,
    callback: RefCell<TaskCallback>,
    primitive: Option<Rc<dyn SchedulingPrimitive>>,
}

impl Task {
    /// Create a task in the `Scheduling` state
    pub(crate) fn new(
        zone: &Zone,
        kind: TaskKind,
        label: impl Into<String>,
        data: TaskData,
        callback: TaskCallback,
        primitive: Option<Rc<dyn SchedulingPrimitive>>,
    ) -> Self {
        Self(Rc::new(TaskInner {
            id: TaskId::next(),
            kind,
            label: label.into(),
            zone: zone.clone(),
            data,
            state: Cell::new(TaskState::Scheduling),
            run_count: Cell::new(0),
            callback: RefCell::new(callback),
            primitive,
        }))
    }

    /// Get the task identifier
    pub fn id(&self) -> TaskId {
        self.0.id
    }

    /// Get the task kind
    pub fn kind(&self) -> TaskKind {
        self.0.kind
    }

    /// Name of the primitive that created the task (e.g. `"setTimeout"`)
    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// Zone that was current when the task was scheduled
    pub fn zone(&self) -> &Zone {
        &self.0.zone
    }

    /// Scheduler-specific data
    pub fn data(&self) -> TaskData {
        self.0.data
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        self.0.state.get()
    }

    /// How many times the callback has started
    pub fn run_count(&self) -> u64 {
        self.0.run_count.get()
    }

    /// Check if the task re-arms after firing
    pub fn is_periodic(&self) -> bool {
        self.0.kind == TaskKind::Periodic
    }

    /// Underlying primitive the root delegate arms, if any
    pub fn primitive(&self) -> Option<&Rc<dyn SchedulingPrimitive>> {
        self.0.primitive.as_ref()
    }

    /// Run the task in its own zone
    ///
    /// This is what a host (or the virtual clock) calls when the
    /// underlying mechanism fires.
    pub fn invoke(&self) -> TaskResult {
        self.0.zone.run_task(self)
    }

    /// Cancel the task through its own zone
    pub fn cancel(&self) -> ZoneResult<()> {
        self.0.zone.cancel_task(self)
    }

    /// Move to `to`, provided the current state is one of `from`
    pub(crate) fn transition(&self, to: TaskState, from: &[TaskState]) -> ZoneResult<()> {
        let current = self.state();
        if !from.contains(&current) {
            return Err(ZoneError::InvalidTransition {
                label: self.0.label.clone(),
                from: current,
                to,
            });
        }
        self.0.state.set(to);
        Ok(())
    }

    pub(crate) fn record_run(&self) {
        self.0.run_count.set(self.0.run_count.get() + 1);
    }

    /// Invoke the raw callback without any zone bookkeeping
    pub(crate) fn call(&self) -> TaskResult {
        let mut guard = self
            .0
            .callback
            .try_borrow_mut()
            .map_err(|_| ZoneError::TaskBusy {
                label: self.0.label.clone(),
            })?;
        let callback: &mut TaskCallback = &mut guard;
        callback()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("label", &self.0.label)
            .field("zone", &self.0.zone.name())
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .finish()
    }
}
