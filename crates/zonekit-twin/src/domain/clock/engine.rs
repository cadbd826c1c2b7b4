//! Virtual Clock Engine
//!
//! Pure bookkeeping for the fake event loop: virtual time, the timer queue,
//! the immediate FIFO, and the fake wall clock. Nothing here runs user
//! code; the fake-async driver pops work out of the clock, releases its
//! borrow, and only then invokes the task.
//!
//! ```text
//!   ┌───────────────────────────────────────────────┐
//!   │ VirtualClock                                  │
//!   │   now ───────────────▶ only moves forward     │
//!   │   immediate: VecDeque<Task>       (FIFO)      │
//!   │   timers:    TimerQueue  (fire_at, seq)       │
//!   │   wall:      base + (now - anchor)            │
//!   └───────────────────────────────────────────────┘
//! ```

use super::queue::TimerQueue;
use super::types::{DueTimer, PendingTimer, TaskCounts, TimerKey, VirtualTimeMs};
use std::collections::{HashSet, VecDeque};
use zonekit_core::{Task, TaskId};

/// Virtual clock state of one activation
#[derive(Debug)]
pub struct VirtualClock {
    now: VirtualTimeMs,
    /// Wall-clock reading at `wall_anchor`
    wall_base_ms: u64,
    wall_anchor: VirtualTimeMs,
    timers: TimerQueue,
    immediate: VecDeque<Task>,
}

impl VirtualClock {
    /// Create a clock at virtual time 0 whose wall clock reads
    /// `wall_base_ms`
    pub fn new(wall_base_ms: u64) -> Self {
        Self {
            now: 0,
            wall_base_ms,
            wall_anchor: 0,
            timers: TimerQueue::new(),
            immediate: VecDeque::new(),
        }
    }

    /// Current virtual time
    pub fn now_ms(&self) -> VirtualTimeMs {
        self.now
    }

    /// Fake wall-clock time: the base plus virtual time elapsed since it
    /// was set
    pub fn system_time_ms(&self) -> u64 {
        self.wall_base_ms
            .saturating_add(self.now.saturating_sub(self.wall_anchor))
    }

    /// Rebase the fake wall clock without moving virtual time
    pub fn set_system_time_ms(&mut self, ms: u64) {
        self.wall_base_ms = ms;
        self.wall_anchor = self.now;
    }

    /// Move virtual time forward to `time`; earlier values are ignored
    ///
    /// Timers left behind (deferred work of a non-synchronous advance) fire
    /// on the next advance, at the time reached by then.
    pub fn advance_to(&mut self, time: VirtualTimeMs) {
        self.now = self.now.max(time);
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Immediate work
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Append immediate work
    pub fn enqueue_immediate(&mut self, task: Task) {
        self.immediate.push_back(task);
    }

    /// Take the head of the immediate FIFO
    pub fn pop_immediate(&mut self) -> Option<Task> {
        self.immediate.pop_front()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Timers
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Queue a one-shot timer `delay_ms` from now
    pub fn schedule_once(&mut self, task: Task, delay_ms: u64, tracked: bool) -> TimerKey {
        let fire_at = self.now.saturating_add(delay_ms);
        self.timers.push(fire_at, PendingTimer::one_shot(task, tracked))
    }

    /// Queue a periodic timer firing every `interval_ms`, starting one
    /// interval from now
    pub fn schedule_periodic(&mut self, task: Task, interval_ms: u64) -> TimerKey {
        let interval = interval_ms.max(1);
        let fire_at = self.now.saturating_add(interval);
        self.timers.push(fire_at, PendingTimer::periodic(task, interval))
    }

    /// Pop the earliest timer due by `deadline` and move virtual time to its
    /// fire time
    pub fn pop_due(
        &mut self,
        deadline: VirtualTimeMs,
        eligible: Option<&HashSet<TaskId>>,
    ) -> Option<DueTimer> {
        let due = self.timers.pop_due(deadline, eligible)?;
        self.now = self.now.max(due.fire_at);
        Some(due)
    }

    /// Put a fired periodic timer back, one interval after it fired
    pub fn rearm(&mut self, due: DueTimer) -> Option<TimerKey> {
        let interval = due.timer.interval?;
        Some(
            self.timers
                .push(due.fire_at.saturating_add(interval), due.timer),
        )
    }

    /// Drop a task from whichever queue holds it
    pub fn cancel(&mut self, id: TaskId) -> bool {
        if self.timers.remove(id).is_some() {
            return true;
        }
        let before = self.immediate.len();
        self.immediate.retain(|task| task.id() != id);
        before != self.immediate.len()
    }

    /// Fire time of the earliest timer
    pub fn next_fire_at(&self) -> Option<VirtualTimeMs> {
        self.timers.next_fire_at()
    }

    /// Fire time of the latest timer
    pub fn last_fire_at(&self) -> Option<VirtualTimeMs> {
        self.timers.last_fire_at()
    }

    /// The `n`-th distinct upcoming one-shot fire time
    pub fn nth_one_shot_fire_at(&self, n: usize) -> Option<VirtualTimeMs> {
        self.timers.nth_one_shot_fire_at(n)
    }

    /// Fire time of the earliest tracked one-shot timer
    pub fn next_tracked_one_shot_at(&self) -> Option<VirtualTimeMs> {
        self.timers.next_tracked_one_shot_at()
    }

    /// Ids of every pending timer
    pub fn timer_ids(&self) -> HashSet<TaskId> {
        self.timers.ids()
    }

    /// Tasks of pending timers, periodic ones only if `periodic_only`
    pub fn timer_tasks(&self, periodic_only: bool) -> Vec<Task> {
        self.timers
            .iter()
            .filter(|(_, timer)| !periodic_only || timer.is_periodic())
            .map(|(_, timer)| timer.task.clone())
            .collect()
    }

    /// Every queued task, immediate work first
    pub fn pending_tasks(&self) -> Vec<Task> {
        let mut tasks = Vec::with_capacity(self.immediate.len() + self.timers.len());
        tasks.extend(self.immediate.iter().cloned());
        tasks.extend(self.timers.iter().map(|(_, timer)| timer.task.clone()));
        tasks
    }

    /// Queue sizes
    pub fn counts(&self) -> TaskCounts {
        self.timers.iter().fold(
            TaskCounts {
                immediate: self.immediate.len(),
                ..TaskCounts::default()
            },
            |mut counts, (_, timer)| {
                if timer.is_periodic() {
                    counts.periodic += 1;
                } else {
                    counts.one_shot += 1;
                    if !timer.tracked {
                        counts.untracked += 1;
                    }
                }
                counts
            },
        )
    }

    /// Drop all queued work; virtual time is kept
    pub fn reset(&mut self) {
        self.timers.clear();
        self.immediate.clear();
    }
}
