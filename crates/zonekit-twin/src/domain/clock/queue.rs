//! Timer Queue
//!
//! # Design
//! - `BTreeMap<TimerKey, PendingTimer>` keeps timers in (fire time,
//!   sequence) order and allows removing from the middle
//! - `BTreeMap<TaskId, TimerKey>` finds a timer again when its task is
//!   cancelled
//! - Sequence numbers are never reused within one queue, so a re-armed
//!   periodic timer goes behind everything already due at its new instant

use super::types::{DueTimer, PendingTimer, Sequence, TimerKey, VirtualTimeMs};
use std::collections::{BTreeMap, HashSet};
use zonekit_core::TaskId;

/// Ordered set of pending one-shot and periodic timers
#[derive(Debug, Default)]
pub struct TimerQueue {
    timers: BTreeMap<TimerKey, PendingTimer>,
    index: BTreeMap<TaskId, TimerKey>,
    next_seq: Sequence,
}

impl TimerQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a timer due at `fire_at`
    pub fn push(&mut self, fire_at: VirtualTimeMs, timer: PendingTimer) -> TimerKey {
        let key = TimerKey::new(fire_at, self.next_seq);
        self.next_seq += 1;
        if let Some(stale) = self.index.insert(timer.id(), key) {
            self.timers.remove(&stale);
        }
        self.timers.insert(key, timer);
        key
    }

    /// Remove the earliest timer due at or before `deadline`
    ///
    /// With `eligible` set, timers whose task is not in the set are skipped
    /// (they stay queued).
    pub fn pop_due(
        &mut self,
        deadline: VirtualTimeMs,
        eligible: Option<&HashSet<TaskId>>,
    ) -> Option<DueTimer> {
        let key = self
            .timers
            .iter()
            .take_while(|(key, _)| key.fire_at <= deadline)
            .find(|(_, timer)| eligible.map_or(true, |ids| ids.contains(&timer.id())))
            .map(|(key, _)| *key)?;
        let timer = self.timers.remove(&key)?;
        self.index.remove(&timer.id());
        Some(DueTimer {
            fire_at: key.fire_at,
            timer,
        })
    }

    /// Remove the timer belonging to `id`
    pub fn remove(&mut self, id: TaskId) -> Option<PendingTimer> {
        let key = self.index.remove(&id)?;
        self.timers.remove(&key)
    }

    /// Check if a timer for `id` is queued
    pub fn contains(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    /// Fire time of the earliest timer
    pub fn next_fire_at(&self) -> Option<VirtualTimeMs> {
        self.timers.keys().next().map(|key| key.fire_at)
    }

    /// Fire time of the latest timer
    pub fn last_fire_at(&self) -> Option<VirtualTimeMs> {
        self.timers.keys().next_back().map(|key| key.fire_at)
    }

    /// The `n`-th (1-based) distinct fire time among one-shot timers
    pub fn nth_one_shot_fire_at(&self, n: usize) -> Option<VirtualTimeMs> {
        let mut distinct = self
            .timers
            .iter()
            .filter(|(_, timer)| !timer.is_periodic())
            .map(|(key, _)| key.fire_at)
            .collect::<Vec<_>>();
        distinct.dedup();
        n.checked_sub(1).and_then(|i| distinct.get(i).copied())
    }

    /// Fire time of the earliest tracked one-shot timer
    pub fn next_tracked_one_shot_at(&self) -> Option<VirtualTimeMs> {
        self.timers
            .iter()
            .find(|(_, timer)| timer.tracked && !timer.is_periodic())
            .map(|(key, _)| key.fire_at)
    }

    /// Ids of every queued timer
    pub fn ids(&self) -> HashSet<TaskId> {
        self.index.keys().copied().collect()
    }

    /// Timers in firing order
    pub fn iter(&self) -> impl Iterator<Item = (&TimerKey, &PendingTimer)> {
        self.timers.iter()
    }

    /// Number of queued timers
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Drop every timer
    pub fn clear(&mut self) {
        self.timers.clear();
        self.index.clear();
    }
}
