//! Virtual Clock Types

use zonekit_core::{Task, TaskId, TaskKind};

/// Virtual time in milliseconds since the activation started
pub type VirtualTimeMs = u64;

/// Insertion sequence; breaks ties between timers due at the same instant
pub type Sequence = u64;

/// Position of a timer in the queue
///
/// Ordered by fire time first, then by insertion sequence, so timers due at
/// the same instant fire in the order they were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerKey {
    /// When the timer fires (virtual time)
    pub fire_at: VirtualTimeMs,
    /// Insertion sequence
    pub seq: Sequence,
}

impl TimerKey {
    /// Create a new key
    #[inline(always)]
    pub const fn new(fire_at: VirtualTimeMs, seq: Sequence) -> Self {
        Self { fire_at, seq }
    }
}

/// A timer waiting in the queue
#[derive(Debug, Clone)]
pub struct PendingTimer {
    /// Task to invoke when the timer fires
    pub task: Task,
    /// Re-arm interval; `None` for one-shot timers
    pub interval: Option<VirtualTimeMs>,
    /// Counted for leak checks and drain termination
    pub tracked: bool,
}

impl PendingTimer {
    /// One-shot timer
    pub fn one_shot(task: Task, tracked: bool) -> Self {
        Self {
            task,
            interval: None,
            tracked,
        }
    }

    /// Periodic timer re-armed every `interval` ms
    pub fn periodic(task: Task, interval: VirtualTimeMs) -> Self {
        Self {
            task,
            interval: Some(interval),
            tracked: true,
        }
    }

    /// Check if the timer re-arms after firing
    pub fn is_periodic(&self) -> bool {
        self.interval.is_some()
    }

    /// Id of the wrapped task
    pub fn id(&self) -> TaskId {
        self.task.id()
    }
}

/// A timer removed from the queue because it is due
#[derive(Debug, Clone)]
pub struct DueTimer {
    /// When it was due
    pub fire_at: VirtualTimeMs,
    /// The timer itself
    pub timer: PendingTimer,
}

/// Queue sizes, partitioned by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    /// Pending one-shot timers, untracked ones included
    pub one_shot: usize,
    /// Pending periodic timers
    pub periodic: usize,
    /// Pending immediate (micro) work
    pub immediate: usize,
    /// Pending one-shot timers excluded from leak checks
    pub untracked: usize,
}

impl TaskCounts {
    /// One-shot timers that count as leaked work
    pub fn tracked_one_shot(&self) -> usize {
        self.one_shot.saturating_sub(self.untracked)
    }

    /// Size of the queue holding `kind`
    pub fn of(&self, kind: TaskKind) -> usize {
        match kind {
            TaskKind::Micro => self.immediate,
            TaskKind::OneShot => self.one_shot,
            TaskKind::Periodic => self.periodic,
        }
    }
}
