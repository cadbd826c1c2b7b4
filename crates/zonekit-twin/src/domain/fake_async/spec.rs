//! Zone hooks that divert scheduling into the virtual clock

use super::clock::EngineCore;
use super::config::FakeAsyncConfig;
use std::rc::Rc;
use tracing::trace;
use zonekit_core::{Task, TaskKind, Zone, ZoneDelegate, ZoneError, ZoneResult, ZoneSpec};

/// Hook bundle of the fake-async zone
///
/// While the window is open every task scheduled in the zone (or below it)
/// is queued on the virtual clock instead of reaching the host. Once the
/// window has closed scheduling falls through to the parent again.
pub struct FakeAsyncZoneSpec {
    core: Rc<EngineCore>,
}

impl FakeAsyncZoneSpec {
    pub(crate) fn new(core: Rc<EngineCore>) -> Self {
        Self { core }
    }

    fn enqueue(&self, task: &Task) {
        let config = &self.core.config;
        let data = task.data();
        let mut clock = self.core.clock.borrow_mut();
        match task.kind() {
            TaskKind::Micro => clock.enqueue_immediate(task.clone()),
            TaskKind::OneShot => {
                let animation = FakeAsyncConfig::is_animation_frame(task.label());
                let delay = if animation {
                    config.animation_frame_ms
                } else {
                    data.delay_ms
                };
                let tracked = !data.untracked && (!animation || config.track_animation_frames);
                let key = clock.schedule_once(task.clone(), delay, tracked);
                trace!(task = %task.id(), label = task.label(), fire_at = key.fire_at, tracked, "timer queued");
            }
            TaskKind::Periodic => {
                let key = clock.schedule_periodic(task.clone(), data.delay_ms);
                trace!(task = %task.id(), label = task.label(), fire_at = key.fire_at, "periodic timer queued");
            }
        }
    }
}

impl ZoneSpec for FakeAsyncZoneSpec {
    fn on_schedule_task(
        &self,
        parent: &ZoneDelegate,
        _current: &Zone,
        target: &Zone,
        task: Task,
    ) -> ZoneResult<Task> {
        if !self.core.active.get() {
            return parent.schedule_task(target, task);
        }
        if self.core.config.is_rejected(task.label()) {
            return Err(ZoneError::Rejected {
                label: task.label().to_owned(),
                reason: "cannot reach the host from inside a fake async activation".into(),
            });
        }
        self.enqueue(&task);
        Ok(task)
    }

    fn on_cancel_task(
        &self,
        parent: &ZoneDelegate,
        _current: &Zone,
        target: &Zone,
        task: &Task,
    ) -> ZoneResult<()> {
        let removed = self.core.clock.borrow_mut().cancel(task.id());
        if !removed && !self.core.active.get() {
            // scheduled on the host after the window closed
            return parent.cancel_task(target, task);
        }
        trace!(task = %task.id(), label = task.label(), removed, "task removed from virtual clock");
        Ok(())
    }
}

impl std::fmt::Debug for FakeAsyncZoneSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeAsyncZoneSpec")
            .field("active", &self.core.active.get())
            .finish()
    }
}
