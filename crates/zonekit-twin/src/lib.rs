//! Zonekit Digital Twin
//!
//! # Overview
//!
//! `zonekit-twin` is a deterministic stand-in for the host event loop.
//! Code running inside a fake-async activation schedules timers and
//! immediate work as usual; nothing fires until the test moves the virtual
//! clock forward.
//!
//! # Laws
//!
//! - Virtual time never decreases and only moves through explicit
//!   advancement
//! - Immediate work is FIFO and drained to a fixpoint before timed work at
//!   any instant
//! - Timers fire in (fire time, insertion sequence) order
//! - Periodic timers re-arm at previous fire time + interval
//! - A window closes with zero pending timers or it fails
//!
//! # Usage
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use zonekit_core::{TaskData, TaskKind, Zone};
//! use zonekit_twin::FakeAsync;
//!
//! let ticks = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&ticks);
//! FakeAsync::activate(|clock| {
//!     Zone::current().schedule_periodic_task("setInterval", TaskData::delay(10), None, move || {
//!         counter.set(counter.get() + 1);
//!         Ok(())
//!     })?;
//!     clock.advance(35)?;
//!     assert_eq!(clock.task_count(TaskKind::Periodic)?, 1);
//!     clock.discard_periodic()?;
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(ticks.get(), 3);
//! ```

pub mod domain;

pub use domain::{
    system_time_ms, AdvanceOptions, ConfigError, FakeAsync, FakeAsyncConfig, FakeAsyncError,
    FakeAsyncZoneSpec, FakeClock, FAKE_ASYNC_PROPERTY, FAKE_ASYNC_ZONE_NAME, TaskCounts, VirtualTimeMs,
};
