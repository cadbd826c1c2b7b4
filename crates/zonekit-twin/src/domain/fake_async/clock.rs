//! # Fake Clock
//!
//! Handle through which a test drives the virtual clock of the active
//! window.
//!
//! Every driving operation follows the same discipline: borrow the engine
//! state, pop exactly one unit of work, release the borrow, and only then
//! invoke the task. Callbacks are therefore free to schedule or cancel
//! more work on the same clock.
//!
//! ```text
//!   advance(ms)
//!     ├─ drain_immediate()
//!     └─ loop: pop earliest timer ≤ deadline ──▶ now = fire_at
//!              │                                   │
//!              ▼                                   ▼
//!         task.invoke()  ──▶ re-arm periodic ──▶ drain_immediate()
//!     now = start + ms
//! ```

use super::config::FakeAsyncConfig;
use super::error::FakeAsyncError;
use super::window::FAKE_ASYNC_PROPERTY;
use crate::domain::clock::{DueTimer, TaskCounts, VirtualClock, VirtualTimeMs};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};
use zonekit_core::{Task, TaskId, TaskKind, TaskState, Zone};

/// Engine state shared by the clock handle and the zone hooks
pub(crate) struct EngineCore {
    pub(crate) clock: RefCell<VirtualClock>,
    pub(crate) config: FakeAsyncConfig,
    pub(crate) active: Cell<bool>,
}

/// Options for [`FakeClock::advance_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOptions {
    /// Timers scheduled during the advance fire if they fall inside the
    /// window; when false only timers pending at the start are eligible
    pub process_new_work_synchronously: bool,
}

impl Default for AdvanceOptions {
    fn default() -> Self {
        Self {
            process_new_work_synchronously: true,
        }
    }
}

/// Handle to the virtual clock of a fake-async activation
#[derive(Clone)]
pub struct FakeClock {
    core: Rc<EngineCore>,
}

impl FakeClock {
    pub(crate) fn new(config: FakeAsyncConfig, wall_base_ms: u64) -> Self {
        Self {
            core: Rc::new(EngineCore {
                clock: RefCell::new(VirtualClock::new(wall_base_ms)),
                config,
                active: Cell::new(true),
            }),
        }
    }

    pub(crate) fn core(&self) -> Rc<EngineCore> {
        Rc::clone(&self.core)
    }

    /// Clock of the activation the current zone belongs to
    pub fn current() -> Result<FakeClock, FakeAsyncError> {
        Self::from_zone(&Zone::current())
            .filter(FakeClock::is_active)
            .ok_or(FakeAsyncError::NotActive {
                operation: "FakeClock::current",
            })
    }

    /// Clock stored on `zone` or one of its ancestors, active or not
    pub fn from_zone(zone: &Zone) -> Option<FakeClock> {
        zone.get::<FakeClock>(FAKE_ASYNC_PROPERTY)
            .map(|clock| FakeClock::clone(&clock))
    }

    /// Check if the window this clock belongs to is still open
    pub fn is_active(&self) -> bool {
        self.core.active.get()
    }

    /// Configuration of the activation
    pub fn config(&self) -> &FakeAsyncConfig {
        &self.core.config
    }

    fn ensure_active(&self, operation: &'static str) -> Result<(), FakeAsyncError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(FakeAsyncError::NotActive { operation })
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Time
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Virtual milliseconds since the activation started
    pub fn now_ms(&self) -> VirtualTimeMs {
        self.core.clock.borrow().now_ms()
    }

    /// Fake wall-clock time in milliseconds since the Unix epoch
    pub fn system_time_ms(&self) -> u64 {
        self.core.clock.borrow().system_time_ms()
    }

    /// Make the fake wall clock read `ms` now; virtual time is unaffected
    pub fn set_system_time_ms(&self, ms: u64) -> Result<(), FakeAsyncError> {
        self.ensure_active("set_system_time_ms")?;
        self.core.clock.borrow_mut().set_system_time_ms(ms);
        Ok(())
    }

    /// Host wall-clock time in milliseconds since the Unix epoch
    pub fn real_system_time_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Driving
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Run immediate work until the FIFO is empty, including work queued
    /// while draining
    ///
    /// A failing task stops the drain; work behind it stays queued.
    pub fn drain_immediate(&self) -> Result<usize, FakeAsyncError> {
        self.ensure_active("drain_immediate")?;
        let mut ran = 0;
        while let Some(task) = self.pop_immediate() {
            ran += 1;
            task.invoke()?;
        }
        if ran > 0 {
            trace!(ran, "immediate queue drained");
        }
        Ok(ran)
    }

    /// Move virtual time forward by `ms`, firing everything due on the way
    pub fn advance(&self, ms: u64) -> Result<(), FakeAsyncError> {
        self.advance_with(ms, AdvanceOptions::default())
    }

    /// [`advance`](FakeClock::advance) with explicit options
    ///
    /// If a task fails, the advance stops with virtual time at that task's
    /// fire time; remaining timers fire on later calls.
    pub fn advance_with(&self, ms: u64, options: AdvanceOptions) -> Result<(), FakeAsyncError> {
        self.ensure_active("advance")?;
        let deadline = self.now_ms().saturating_add(ms);
        self.drain_immediate()?;

        let eligible = (!options.process_new_work_synchronously)
            .then(|| self.core.clock.borrow().timer_ids());
        while let Some(due) = self.pop_due(deadline, eligible.as_ref()) {
            self.fire(due)?;
        }
        self.core.clock.borrow_mut().advance_to(deadline);
        trace!(ms, now = deadline, "virtual clock advanced");
        Ok(())
    }

    /// Advance to each next tracked one-shot fire time until none is left
    ///
    /// Periodic and untracked timers due on the way fire but never keep the
    /// loop going. Fails with [`FakeAsyncError::FlushLimitExceeded`] when
    /// more than `max_rounds` rounds would be needed. Returns the virtual
    /// time elapsed.
    pub fn drain_all(&self, max_rounds: usize) -> Result<VirtualTimeMs, FakeAsyncError> {
        self.ensure_active("drain_all")?;
        let start = self.now_ms();
        self.drain_immediate()?;

        let mut rounds = 0;
        while let Some(next) = self.next_tracked_one_shot_at() {
            if rounds >= max_rounds {
                warn!(limit = max_rounds, "drain_all gave up");
                return Err(FakeAsyncError::FlushLimitExceeded { limit: max_rounds });
            }
            rounds += 1;
            self.advance(next.saturating_sub(self.now_ms()))?;
        }
        let elapsed = self.now_ms() - start;
        debug!(rounds, elapsed, "all timers drained");
        Ok(elapsed)
    }

    /// [`drain_all`](FakeClock::drain_all) with the configured limit
    pub fn flush(&self) -> Result<VirtualTimeMs, FakeAsyncError> {
        self.drain_all(self.core.config.flush_limit)
    }

    /// Advance to the last fire time pending now, letting periodic timers
    /// run throughout
    pub fn drain_periodic(&self) -> Result<VirtualTimeMs, FakeAsyncError> {
        self.advance_to_last("drain_periodic", AdvanceOptions::default())
    }

    /// Advance to the last fire time pending now; work scheduled meanwhile
    /// waits for the next advance
    pub fn advance_through_pending(&self) -> Result<VirtualTimeMs, FakeAsyncError> {
        self.advance_to_last(
            "advance_through_pending",
            AdvanceOptions {
                process_new_work_synchronously: false,
            },
        )
    }

    /// Advance to the `steps`-th next distinct fire time among pending
    /// one-shot timers
    ///
    /// Does nothing and returns 0 when fewer distinct times are pending.
    pub fn advance_to_next(&self, steps: usize) -> Result<VirtualTimeMs, FakeAsyncError> {
        self.ensure_active("advance_to_next")?;
        let start = self.now_ms();
        let target = self.core.clock.borrow().nth_one_shot_fire_at(steps);
        match target {
            Some(target) => {
                let elapsed = target.saturating_sub(start);
                self.advance(elapsed)?;
                Ok(elapsed)
            }
            None => Ok(0),
        }
    }

    /// Cancel pending periodic timers without running them
    pub fn discard_periodic(&self) -> Result<usize, FakeAsyncError> {
        self.ensure_active("discard_periodic")?;
        self.discard(true)
    }

    /// Cancel every pending one-shot and periodic timer without running it
    pub fn discard_all(&self) -> Result<usize, FakeAsyncError> {
        self.ensure_active("discard_all")?;
        self.discard(false)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Inspection
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Queue sizes by kind
    pub fn task_counts(&self) -> Result<TaskCounts, FakeAsyncError> {
        self.ensure_active("task_counts")?;
        Ok(self.core.clock.borrow().counts())
    }

    /// Size of the queue holding `kind`
    pub fn task_count(&self, kind: TaskKind) -> Result<usize, FakeAsyncError> {
        self.task_counts().map(|counts| counts.of(kind))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Window lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Fail on leftover timers, cancelling them first
    pub(crate) fn check_leaks(&self) -> Result<(), FakeAsyncError> {
        let counts = self.task_counts()?;
        if counts.periodic > 0 || counts.tracked_one_shot() > 0 {
            warn!(
                periodic = counts.periodic,
                one_shot = counts.tracked_one_shot(),
                "timers left in the queue"
            );
        }
        let leak = if counts.periodic > 0 {
            Some(FakeAsyncError::PendingPeriodicTimers(counts.periodic))
        } else if counts.tracked_one_shot() > 0 {
            Some(FakeAsyncError::PendingTimers(counts.tracked_one_shot()))
        } else {
            None
        };
        self.discard_all()?;
        match leak {
            Some(error) => {
                warn!(%error, "fake async window closed with pending timers");
                Err(error)
            }
            None => Ok(()),
        }
    }

    /// Close the window: cancel whatever is still queued and stop
    /// intercepting
    pub(crate) fn deactivate(&self) {
        let leftovers = match self.core.clock.try_borrow() {
            Ok(clock) => clock.pending_tasks(),
            Err(_) => Vec::new(),
        };
        for task in &leftovers {
            if let Err(error) = task.cancel() {
                debug!(task = %task.id(), %error, "could not cancel leftover task");
            }
        }
        if let Ok(mut clock) = self.core.clock.try_borrow_mut() {
            clock.reset();
        }
        self.core.active.set(false);
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Internals
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn pop_immediate(&self) -> Option<Task> {
        self.core.clock.borrow_mut().pop_immediate()
    }

    fn pop_due(&self, deadline: VirtualTimeMs, eligible: Option<&HashSet<TaskId>>) -> Option<DueTimer> {
        self.core.clock.borrow_mut().pop_due(deadline, eligible)
    }

    fn next_tracked_one_shot_at(&self) -> Option<VirtualTimeMs> {
        self.core.clock.borrow().next_tracked_one_shot_at()
    }

    fn last_fire_at(&self) -> Option<VirtualTimeMs> {
        self.core.clock.borrow().last_fire_at()
    }

    fn advance_to_last(
        &self,
        operation: &'static str,
        options: AdvanceOptions,
    ) -> Result<VirtualTimeMs, FakeAsyncError> {
        self.ensure_active(operation)?;
        let start = self.now_ms();
        match self.last_fire_at() {
            Some(last) => {
                let elapsed = last.saturating_sub(start);
                self.advance_with(elapsed, options)?;
                Ok(elapsed)
            }
            None => {
                self.drain_immediate()?;
                Ok(0)
            }
        }
    }

    /// Run one due timer, then the immediate work it produced
    fn fire(&self, due: DueTimer) -> Result<(), FakeAsyncError> {
        let task = due.timer.task.clone();
        trace!(task = %task.id(), label = task.label(), at = due.fire_at, "timer fired");

        if let Err(error) = task.invoke() {
            if due.timer.is_periodic() {
                // a failing periodic timer is not re-armed
                if let Err(cancel) = task.cancel() {
                    debug!(task = %task.id(), error = %cancel, "could not retire failed periodic timer");
                }
            }
            return Err(error.into());
        }

        if due.timer.is_periodic() && task.state() == TaskState::Scheduled {
            self.core.clock.borrow_mut().rearm(due);
        }
        self.drain_immediate()?;
        Ok(())
    }

    fn discard(&self, periodic_only: bool) -> Result<usize, FakeAsyncError> {
        let tasks = self.core.clock.borrow().timer_tasks(periodic_only);
        for task in &tasks {
            task.cancel()?;
        }
        if !tasks.is_empty() {
            debug!(discarded = tasks.len(), periodic_only, "timers discarded");
        }
        Ok(tasks.len())
    }
}

impl fmt::Debug for FakeClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("FakeClock");
        debug.field("active", &self.is_active());
        if let Ok(clock) = self.core.clock.try_borrow() {
            debug
                .field("now_ms", &clock.now_ms())
                .field("counts", &clock.counts());
        }
        debug.finish()
    }
}
