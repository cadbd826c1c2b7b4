//! # Patch Registry
//!
//! Explicit table of interceptable scheduling primitives. Call sites never
//! reach a raw primitive; they go through [`PatchRegistry::schedule`],
//! which captures the current zone, builds a [`Task`], and commits it
//! through that zone's hook chain. The root delegate finally arms the
//! registered primitive.
//!
//! ```text
//!   registry.schedule("setTimeout", cb, data)
//!      │ capture Zone::current()
//!      ▼
//!   Task { Scheduling } ──▶ on_schedule_task chain ──▶ root: wrapped.arm(task)
//!                                                          │
//!                                               original primitive fires
//!                                                          ▼
//!                                                   task.invoke()
//! ```
//!
//! Installing a name twice keeps the first original and the first wrapper.
//! [`PatchRegistry::original`] always returns the unwrapped primitive so
//! another layer can build on it.

use crate::context::Zone;
use crate::error::{TaskResult, ZoneError, ZoneResult};
use crate::task::{Task, TaskData, TaskKind};
use crate::traits::SchedulingPrimitive;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Shared handle to a scheduling primitive
pub type PrimitiveHandle = Rc<dyn SchedulingPrimitive>;

struct PatchEntry {
    kind: TaskKind,
    original: PrimitiveHandle,
    wrapped: PrimitiveHandle,
}

/// Registration table mapping primitive names to their interception
/// wrappers
#[derive(Default)]
pub struct PatchRegistry {
    entries: RefCell<HashMap<String, PatchEntry>>,
}

impl PatchRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `original` under `name` with no extra wrapping
    ///
    /// Returns `false` (and changes nothing) if `name` is already installed.
    pub fn install(
        &self,
        name: impl Into<String>,
        kind: TaskKind,
        original: PrimitiveHandle,
    ) -> bool {
        self.install_with(name, kind, original, |original| original)
    }

    /// Register `original` under `name`, layering the wrapper built by
    /// `factory` on top of it
    ///
    /// The factory only runs for a first installation.
    pub fn install_with<F>(
        &self,
        name: impl Into<String>,
        kind: TaskKind,
        original: PrimitiveHandle,
        factory: F,
    ) -> bool
    where
        F: FnOnce(PrimitiveHandle) -> PrimitiveHandle,
    {
        let name = name.into();
        if self.is_installed(&name) {
            debug!(primitive = %name, "primitive already patched, keeping first original");
            return false;
        }
        let wrapped = factory(Rc::clone(&original));
        debug!(primitive = %name, %kind, "primitive patched");
        self.entries.borrow_mut().insert(
            name,
            PatchEntry {
                kind,
                original,
                wrapped,
            },
        );
        true
    }

    /// Check if `name` has been installed
    pub fn is_installed(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    /// The unwrapped primitive registered under `name`
    pub fn original(&self, name: &str) -> Option<PrimitiveHandle> {
        self.entries
            .borrow()
            .get(name)
            .map(|entry| Rc::clone(&entry.original))
    }

    /// Kind of task the primitive schedules
    pub fn kind_of(&self, name: &str) -> Option<TaskKind> {
        self.entries.borrow().get(name).map(|entry| entry.kind)
    }

    /// Installed primitive names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Call the patched primitive `name`
    ///
    /// The task is owned by the zone current at the time of the call and
    /// goes through that zone's `on_schedule_task` chain.
    pub fn schedule(
        &self,
        name: &str,
        callback: impl FnMut() -> TaskResult + 'static,
        data: TaskData,
    ) -> ZoneResult<Task> {
        let (kind, wrapped) = {
            let entries = self.entries.borrow();
            let entry = entries.get(name).ok_or_else(|| ZoneError::UnknownPrimitive {
                name: name.to_owned(),
            })?;
            (entry.kind, Rc::clone(&entry.wrapped))
        };

        let zone = Zone::current();
        trace!(primitive = name, zone = %zone.name(), delay_ms = data.delay_ms, "intercepted call");
        zone.schedule_new(kind, name, data, Some(wrapped), Box::new(callback))
    }

    /// Cancel a task created through this registry
    pub fn cancel(&self, task: &Task) -> ZoneResult<()> {
        task.cancel()
    }
}

impl fmt::Debug for PatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchRegistry")
            .field("names", &self.names())
            .finish()
    }
}
