//! # Zone Propagation
//!
//! A [`Zone`] is an immutable node in the execution-context tree. Exactly
//! one zone is *current* on each thread of control at any instant; the only
//! way to change it is to enter a scoped frame through [`Zone::run`],
//! [`Zone::run_guarded`], or [`Zone::run_task`], which restore the previous
//! zone on every exit path (return, `Err`, or unwinding panic).
//!
//! ```text
//!   <root>
//!     ├── app            (properties: user = "ada")
//!     │    └── request   (spec: error logger)
//!     └── fakeAsyncTestZone
//! ```
//!
//! Deferred work scheduled while a zone is current is captured as a
//! [`Task`] owned by that zone; when the task fires it runs inside the same
//! zone again, regardless of what is current at that moment.

use crate::delegate::ZoneDelegate;
use crate::error::{TaskResult, ZoneError, ZoneResult};
use crate::task::{Task, TaskCallback, TaskData, TaskKind, TaskState};
use crate::traits::{HasTaskState, SchedulingPrimitive, ZoneSpec};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

static NEXT_ZONE_ID: AtomicU64 = AtomicU64::new(0);

/// Name given to the root zone of every thread
pub const ROOT_ZONE_NAME: &str = "<root>";

thread_local! {
    static ROOT: Zone = Zone::new_root();
    static FRAMES: RefCell<Vec<Zone>> = const { RefCell::new(Vec::new()) };
    static CURRENT_TASK: RefCell<Option<Task>> = const { RefCell::new(None) };
}

/// Stable zone identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(u64);

impl ZoneId {
    fn next() -> Self {
        Self(NEXT_ZONE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric ID
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zone({})", self.0)
    }
}

/// Opaque property value stored on a zone
pub type PropertyValue = Rc<dyn Any>;

/// Outstanding work of one zone and its descendants, per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskTally {
    /// Scheduled micro tasks
    pub micro: usize,
    /// Scheduled one-shot tasks
    pub one_shot: usize,
    /// Scheduled periodic tasks
    pub periodic: usize,
}

impl TaskTally {
    fn adjusted(self, kind: TaskKind, delta: isize) -> Self {
        let mut next = self;
        let slot = match kind {
            TaskKind::Micro => &mut next.micro,
            TaskKind::OneShot => &mut next.one_shot,
            TaskKind::Periodic => &mut next.periodic,
        };
        *slot = slot.saturating_add_signed(delta);
        next
    }

    /// Check if any macro (one-shot or periodic) work is outstanding
    pub fn has_macro(&self) -> bool {
        self.one_shot + self.periodic > 0
    }

    /// Check if any micro work is outstanding
    pub fn has_micro(&self) -> bool {
        self.micro > 0
    }

    fn has(&self, kind: TaskKind) -> bool {
        if kind.is_macro() {
            self.has_macro()
        } else {
            self.has_micro()
        }
    }
}

/// Options for [`Zone::fork`]
///
/// # Examples
///
/// ```rust
/// use zonekit_core::{Zone, ZoneOptions};
///
/// let zone = Zone::root().fork(ZoneOptions::new("request").property("user", "ada"));
/// assert_eq!(zone.get::<&str>("user").as_deref(), Some(&"ada"));
/// ```
pub struct ZoneOptions {
    name: String,
    spec: Option<Rc<dyn ZoneSpec>>,
    properties: HashMap<String, PropertyValue>,
}

impl ZoneOptions {
    /// Start options for a zone called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: None,
            properties: HashMap::new(),
        }
    }

    /// Attach a hook bundle
    pub fn spec(self, spec: impl ZoneSpec + 'static) -> Self {
        self.shared_spec(Rc::new(spec))
    }

    /// Attach a hook bundle that the caller keeps a handle to
    pub fn shared_spec(mut self, spec: Rc<dyn ZoneSpec>) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Add a property visible to this zone and its descendants
    pub fn property<T: Any>(mut self, key: impl Into<String>, value: T) -> Self {
        self.properties.insert(key.into(), Rc::new(value));
        self
    }

    /// Name the zone will carry
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ZoneOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.properties.keys().collect();
        keys.sort();
        f.debug_struct("ZoneOptions")
            .field("name", &self.name)
            .field("has_spec", &self.spec.is_some())
            .field("properties", &keys)
            .finish()
    }
}

/// Shared handle to an immutable node of the zone tree
#[derive(Clone)]
pub struct Zone(Rc<ZoneNode>);

struct ZoneNode {
    id: ZoneId,
    name: String,
    parent: Option<Zone>,
    properties: HashMap<String, PropertyValue>,
    spec: Option<Rc<dyn ZoneSpec>>,
    tally: Cell<TaskTally>,
}

impl Zone {
    fn new_root() -> Self {
        Self(Rc::new(ZoneNode {
            id: ZoneId::next(),
            name: ROOT_ZONE_NAME.to_owned(),
            parent: None,
            properties: HashMap::new(),
            spec: None,
            tally: Cell::new(TaskTally::default()),
        }))
    }

    /// Build a child node; reached only once the fork chain is exhausted
    pub(crate) fn new_child(parent: &Zone, options: ZoneOptions) -> Self {
        let zone = Self(Rc::new(ZoneNode {
            id: ZoneId::next(),
            name: options.name,
            parent: Some(parent.clone()),
            properties: options.properties,
            spec: options.spec,
            tally: Cell::new(TaskTally::default()),
        }));
        debug!(zone = %zone.name(), parent = %parent.name(), id = %zone.id(), "zone forked");
        zone
    }

    /// Root zone of this thread
    pub fn root() -> Zone {
        ROOT.with(Zone::clone)
    }

    /// Zone current on this thread
    pub fn current() -> Zone {
        FRAMES
            .with(|frames| frames.borrow().last().cloned())
            .unwrap_or_else(Zone::root)
    }

    /// Task whose callback is executing on this thread, if any
    pub fn current_task() -> Option<Task> {
        CURRENT_TASK.with(|task| task.borrow().clone())
    }

    /// Stable identity
    pub fn id(&self) -> ZoneId {
        self.0.id
    }

    /// Human-readable name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Parent node; `None` only for the root
    pub fn parent(&self) -> Option<&Zone> {
        self.0.parent.as_ref()
    }

    /// Check if this is the root zone
    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    /// Outstanding tasks of this zone and its descendants
    pub fn task_tally(&self) -> TaskTally {
        self.0.tally.get()
    }

    pub(crate) fn spec(&self) -> Option<&Rc<dyn ZoneSpec>> {
        self.0.spec.as_ref()
    }

    /// Delegate whose chain starts at this zone
    pub fn delegate(&self) -> ZoneDelegate {
        ZoneDelegate::starting_at(Some(self.clone()))
    }

    pub(crate) fn parent_delegate(&self) -> ZoneDelegate {
        ZoneDelegate::starting_at(self.0.parent.clone())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Properties
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Look up a property, walking towards the root; first match wins
    ///
    /// Returns `None` when the nearest definition holds a different type.
    pub fn get<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        let owner = self.get_zone_with(key)?;
        let value = owner.0.properties.get(key)?;
        Rc::clone(value).downcast::<T>().ok()
    }

    /// Nearest zone (self included) that defines `key`
    pub fn get_zone_with(&self, key: &str) -> Option<Zone> {
        let mut node = Some(self);
        while let Some(zone) = node {
            if zone.0.properties.contains_key(key) {
                return Some(zone.clone());
            }
            node = zone.parent();
        }
        None
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Propagation Primitives
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Create a child zone; has no effect on what is current
    pub fn fork(&self, options: ZoneOptions) -> Zone {
        self.delegate().fork(self, options)
    }

    /// Run `f` with this zone current, restoring the previous zone after
    ///
    /// The callback goes through the `on_invoke` chain. Errors pass through
    /// unchanged.
    pub fn run<R>(&self, f: impl FnOnce() -> TaskResult<R>) -> TaskResult<R> {
        let frame = ZoneFrame::enter(self, None);
        let outcome = self.invoke_once(f);
        frame.exit()?;
        outcome
    }

    /// Like [`run`](Zone::run), but errors are offered to the
    /// `on_handle_error` chain first
    ///
    /// Returns `Ok(None)` when a hook handled the error.
    pub fn run_guarded<R>(&self, f: impl FnOnce() -> TaskResult<R>) -> TaskResult<Option<R>> {
        let frame = ZoneFrame::enter(self, None);
        let outcome = match self.invoke_once(f) {
            Ok(value) => Ok(Some(value)),
            Err(error) => self.offer_error(error).map(|()| None),
        };
        frame.exit()?;
        outcome
    }

    /// Bind a callback to this zone; every call runs guarded in it
    pub fn wrap<F>(&self, mut f: F) -> impl FnMut() -> TaskResult
    where
        F: FnMut() -> TaskResult,
    {
        let zone = self.clone();
        move || zone.run_guarded(&mut f).map(|_| ())
    }

    /// Run a task that belongs to this zone
    ///
    /// Cancelled or finished tasks are skipped. Errors not handled by the
    /// zone's `on_handle_error` chain are returned to the invoker.
    pub fn run_task(&self, task: &Task) -> TaskResult {
        self.ensure_owner(task)?;
        if task.state().is_terminal() {
            trace!(task = %task.id(), state = %task.state(), "skipping finished task");
            return Ok(());
        }

        let reentry = task.state() == TaskState::Running;
        if !reentry {
            task.transition(TaskState::Running, &[TaskState::Scheduled])?;
        }
        task.record_run();
        trace!(task = %task.id(), label = task.label(), zone = %self.name(), "running task");

        let frame = ZoneFrame::enter(self, Some(task.clone()));
        let outcome = self
            .delegate()
            .invoke_task(self, task)
            .or_else(|error| self.offer_error(error));
        let settled = if reentry {
            Ok(())
        } else {
            self.settle(task)
        };
        frame.exit()?;
        settled?;
        outcome
    }

    /// Commit a task created in this zone through the `on_schedule_task`
    /// chain
    pub fn schedule_task(&self, task: Task) -> ZoneResult<Task> {
        self.ensure_owner(&task)?;
        if task.state() != TaskState::Scheduling {
            return Err(ZoneError::InvalidTransition {
                label: task.label().to_owned(),
                from: task.state(),
                to: TaskState::Scheduled,
            });
        }

        let scheduled = match self.delegate().schedule_task(self, task.clone()) {
            Ok(scheduled) => scheduled,
            Err(error) => {
                task.transition(TaskState::Rejected, &[TaskState::Scheduling])?;
                debug!(task = %task.id(), label = task.label(), %error, "task rejected");
                return Err(error);
            }
        };
        // a replacement built by a hook through `schedule_*` was committed
        // (and counted) by that nested call already
        let committed_here = scheduled.state() == TaskState::Scheduling;
        if committed_here {
            scheduled.transition(TaskState::Scheduled, &[TaskState::Scheduling])?;
        }
        if scheduled != task && task.state() == TaskState::Scheduling {
            task.transition(TaskState::Rejected, &[TaskState::Scheduling])?;
            debug!(task = %task.id(), replacement = %scheduled.id(), "task replaced by hook");
        }
        if committed_here {
            Self::update_task_count(&scheduled, 1);
            trace!(task = %scheduled.id(), label = scheduled.label(), kind = %scheduled.kind(), "task scheduled");
        }
        Ok(scheduled)
    }

    /// Schedule immediate work in this zone
    pub fn schedule_micro_task(
        &self,
        label: impl Into<String>,
        callback: impl FnMut() -> TaskResult + 'static,
    ) -> ZoneResult<Task> {
        self.schedule_new(TaskKind::Micro, label, TaskData::default(), None, Box::new(callback))
    }

    /// Schedule one-shot work in this zone
    pub fn schedule_macro_task(
        &self,
        label: impl Into<String>,
        data: TaskData,
        primitive: Option<Rc<dyn SchedulingPrimitive>>,
        callback: impl FnMut() -> TaskResult + 'static,
    ) -> ZoneResult<Task> {
        self.schedule_new(TaskKind::OneShot, label, data, primitive, Box::new(callback))
    }

    /// Schedule periodic work in this zone; `data.delay_ms` is the interval
    pub fn schedule_periodic_task(
        &self,
        label: impl Into<String>,
        data: TaskData,
        primitive: Option<Rc<dyn SchedulingPrimitive>>,
        callback: impl FnMut() -> TaskResult + 'static,
    ) -> ZoneResult<Task> {
        self.schedule_new(TaskKind::Periodic, label, data, primitive, Box::new(callback))
    }

    pub(crate) fn schedule_new(
        &self,
        kind: TaskKind,
        label: impl Into<String>,
        data: TaskData,
        primitive: Option<Rc<dyn SchedulingPrimitive>>,
        callback: TaskCallback,
    ) -> ZoneResult<Task> {
        self.schedule_task(Task::new(self, kind, label, data, callback, primitive))
    }

    /// Cancel a task that belongs to this zone
    ///
    /// Cancelling a task that is not pending is a no-op. A task may cancel
    /// itself while running; a periodic task that does so is not re-armed.
    pub fn cancel_task(&self, task: &Task) -> ZoneResult<()> {
        self.ensure_owner(task)?;
        if !matches!(task.state(), TaskState::Scheduled | TaskState::Running) {
            return Ok(());
        }
        self.delegate().cancel_task(self, task)?;
        task.transition(
            TaskState::Cancelled,
            &[TaskState::Scheduled, TaskState::Running],
        )?;
        Self::update_task_count(task, -1);
        trace!(task = %task.id(), label = task.label(), "task cancelled");
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Internals
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn invoke_once<R>(&self, f: impl FnOnce() -> TaskResult<R>) -> TaskResult<R> {
        let mut pending = Some(f);
        let mut output = None;
        {
            let mut thunk = || -> TaskResult {
                let f = pending.take().ok_or_else(|| ZoneError::CallbackReentered {
                    zone: self.name().to_owned(),
                })?;
                output = Some(f()?);
                Ok(())
            };
            self.delegate().invoke(self, &mut thunk)?;
        }
        output.ok_or_else(|| {
            ZoneError::InvocationSkipped {
                zone: self.name().to_owned(),
            }
            .into()
        })
    }

    fn offer_error(&self, error: anyhow::Error) -> TaskResult {
        if self.delegate().handle_error(self, &error).should_propagate() {
            return Err(error);
        }
        debug!(zone = %self.name(), %error, "error handled by zone");
        Ok(())
    }

    fn ensure_owner(&self, task: &Task) -> ZoneResult<()> {
        if task.zone() == self {
            Ok(())
        } else {
            Err(ZoneError::ForeignTask {
                label: task.label().to_owned(),
                owner: task.zone().name().to_owned(),
                requested: self.name().to_owned(),
            })
        }
    }

    /// Move a task out of `Running` once its callback returned
    fn settle(&self, task: &Task) -> ZoneResult<()> {
        match task.state() {
            TaskState::Running if task.is_periodic() => {
                task.transition(TaskState::Scheduled, &[TaskState::Running])
            }
            TaskState::Running => {
                task.transition(TaskState::Completed, &[TaskState::Running])?;
                Self::update_task_count(task, -1);
                Ok(())
            }
            // cancelled from inside its own callback
            _ => Ok(()),
        }
    }

    /// Adjust outstanding counts from the task's zone up to the root
    fn update_task_count(task: &Task, delta: isize) {
        let origin = task.zone().clone();
        let mut node = Some(origin.clone());
        while let Some(zone) = node {
            let before = zone.0.tally.get();
            let after = before.adjusted(task.kind(), delta);
            zone.0.tally.set(after);
            if before.has(task.kind()) != after.has(task.kind()) {
                if let Some(spec) = zone.spec() {
                    let state = HasTaskState {
                        micro_task: after.has_micro(),
                        macro_task: after.has_macro(),
                        change: task.kind(),
                    };
                    spec.on_has_task(&zone.parent_delegate(), &zone, &origin, state);
                }
            }
            node = zone.parent().cloned();
        }
    }
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Zone {}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("parent", &self.0.parent.as_ref().map(Zone::name))
            .finish()
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Scoped ownership of the current-zone register
///
/// `enter` pushes a frame, `exit` pops it and verifies nesting. If the
/// frame is dropped without `exit` (a panic unwinding through `run`), the
/// drop restores the register silently.
struct ZoneFrame {
    zone: ZoneId,
    depth: usize,
    previous_task: Option<Option<Task>>,
    exited: bool,
}

impl ZoneFrame {
    fn enter(zone: &Zone, task: Option<Task>) -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(zone.clone());
            frames.len()
        });
        let previous_task = task.map(|task| CURRENT_TASK.with(|slot| slot.replace(Some(task))));
        Self {
            zone: zone.id(),
            depth,
            previous_task,
            exited: false,
        }
    }

    fn exit(mut self) -> ZoneResult<()> {
        self.exited = true;
        self.restore()
    }

    fn restore(&mut self) -> ZoneResult<()> {
        if let Some(previous) = self.previous_task.take() {
            CURRENT_TASK.with(|slot| *slot.borrow_mut() = previous);
        }
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            let found = frames.last().map(Zone::id);
            if frames.len() != self.depth || found != Some(self.zone) {
                frames.truncate(self.depth.saturating_sub(1));
                return Err(ZoneError::FrameMismatch {
                    expected: self.zone,
                    found,
                });
            }
            frames.pop();
            Ok(())
        })
    }
}

impl Drop for ZoneFrame {
    fn drop(&mut self) {
        if !self.exited {
            let _ = self.restore();
        }
    }
}
