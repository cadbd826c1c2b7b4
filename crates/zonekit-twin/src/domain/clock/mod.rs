//! Virtual Clock Module
//!
//! # Design
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  FakeClock (fake_async)                                │
//! │  clock.advance(10)                                     │
//! └────────────────────────────────────────────────────────┘
//!                      │ borrow, pop, release
//!                      ▼
//!   VirtualClock ── TimerQueue: BTreeMap<(fire_at, seq), PendingTimer>
//!                └─ immediate:  VecDeque<Task>
//! ```
//!
//! Time never decreases, and timers fire in (fire time, insertion sequence)
//! order.

mod engine;
mod queue;
mod types;

#[cfg(kani)]
mod proofs;

// Re-exports
pub use engine::VirtualClock;
pub use queue::TimerQueue;
pub use types::{DueTimer, PendingTimer, Sequence, TaskCounts, TimerKey, VirtualTimeMs};
