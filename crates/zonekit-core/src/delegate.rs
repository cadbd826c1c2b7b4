//! # Hook Delegation
//!
//! A [`ZoneDelegate`] is a position in the parent-to-root chain. Calling a
//! method on it finds the nearest zone at or above that position which
//! carries a [`ZoneSpec`] and hands it the call together with the delegate
//! for *its* parent. Past the root, the delegate performs the default host
//! operation.

use crate::context::{Zone, ZoneOptions};
use crate::error::{TaskResult, ZoneError, ZoneResult};
use crate::microtask;
use crate::task::{Task, TaskKind};
use crate::traits::{ErrorDisposition, ZoneSpec};
use std::rc::Rc;

/// Entry point into the hook chain at a given zone
#[derive(Clone)]
pub struct ZoneDelegate {
    zone: Option<Zone>,
}

impl ZoneDelegate {
    /// Delegate whose chain starts at `zone`; `None` means past the root
    pub(crate) fn starting_at(zone: Option<Zone>) -> Self {
        Self { zone }
    }

    /// Zone this delegate starts at, if any
    pub fn zone(&self) -> Option<&Zone> {
        self.zone.as_ref()
    }

    /// Nearest zone (at or above the start) that declares a spec
    fn nearest_spec(&self) -> Option<(Zone, Rc<dyn ZoneSpec>)> {
        let mut node = self.zone.clone();
        while let Some(zone) = node {
            if let Some(spec) = zone.spec() {
                return Some((zone.clone(), Rc::clone(spec)));
            }
            node = zone.parent().cloned();
        }
        None
    }

    /// Create a child of `target`
    pub fn fork(&self, target: &Zone, options: ZoneOptions) -> Zone {
        match self.nearest_spec() {
            Some((current, spec)) => {
                spec.on_fork(&current.parent_delegate(), &current, target, options)
            }
            None => Zone::new_child(target, options),
        }
    }

    /// Invoke a callback on behalf of `target`
    pub fn invoke(&self, target: &Zone, callback: &mut dyn FnMut() -> TaskResult) -> TaskResult {
        match self.nearest_spec() {
            Some((current, spec)) => {
                spec.on_invoke(&current.parent_delegate(), &current, target, callback)
            }
            None => callback(),
        }
    }

    /// Offer an error raised in `target`; the root never handles anything
    pub fn handle_error(&self, target: &Zone, error: &anyhow::Error) -> ErrorDisposition {
        match self.nearest_spec() {
            Some((current, spec)) => {
                spec.on_handle_error(&current.parent_delegate(), &current, target, error)
            }
            None => ErrorDisposition::Propagate,
        }
    }

    /// Schedule a task; at the root this arms the task's primitive
    ///
    /// Micro tasks without a primitive go to the host microtask queue.
    pub fn schedule_task(&self, target: &Zone, task: Task) -> ZoneResult<Task> {
        if let Some((current, spec)) = self.nearest_spec() {
            return spec.on_schedule_task(&current.parent_delegate(), &current, target, task);
        }
        match task.primitive() {
            Some(primitive) => {
                primitive.arm(&task)?;
                Ok(task)
            }
            None if task.kind() == TaskKind::Micro => {
                microtask::enqueue(task.clone());
                Ok(task)
            }
            None => Err(ZoneError::MissingPrimitive {
                label: task.label().to_owned(),
            }),
        }
    }

    /// Run a task's callback; at the root this calls it directly
    pub fn invoke_task(&self, target: &Zone, task: &Task) -> TaskResult {
        match self.nearest_spec() {
            Some((current, spec)) => {
                spec.on_invoke_task(&current.parent_delegate(), &current, target, task)
            }
            None => task.call(),
        }
    }

    /// Cancel a task; at the root this disarms the task's primitive
    pub fn cancel_task(&self, target: &Zone, task: &Task) -> ZoneResult<()> {
        if let Some((current, spec)) = self.nearest_spec() {
            return spec.on_cancel_task(&current.parent_delegate(), &current, target, task);
        }
        match task.primitive() {
            Some(primitive) => primitive.disarm(task),
            None if task.kind() == TaskKind::Micro => {
                microtask::remove(task);
                Ok(())
            }
            None => Err(ZoneError::NotCancellable {
                label: task.label().to_owned(),
            }),
        }
    }
}

impl std::fmt::Debug for ZoneDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.zone {
            Some(zone) => write!(f, "ZoneDelegate({})", zone.name()),
            None => f.write_str("ZoneDelegate(<host>)"),
        }
    }
}
