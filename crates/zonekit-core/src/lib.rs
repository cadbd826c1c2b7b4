//! # Zonekit Core
//!
//! Execution-context propagation for single-threaded, event-loop-driven
//! code. Deferred work remembers the zone that scheduled it and runs inside
//! that zone again when it fires.
//!
//! ## Module Organization
//!
//! - `context`: Zone tree, the per-thread current-zone register, run/fork
//! - `delegate`: Parent-to-root hook chain
//! - `error`: Zone error types and result aliases
//! - `microtask`: Host microtask queue for the root delegate
//! - `patch`: Registration table for interceptable scheduling primitives
//! - `task`: Task handle and lifecycle state machine
//! - `traits`: `ZoneSpec` hooks and the `SchedulingPrimitive` contract
//!
//! ## Usage
//!
//! ```rust
//! use zonekit_core::{Zone, ZoneOptions};
//!
//! let zone = Zone::root().fork(ZoneOptions::new("request").property("id", 7_u32));
//! let task = zone
//!     .run(|| {
//!         Ok(Zone::current().schedule_micro_task("queueMicrotask", || {
//!             assert_eq!(Zone::current().name(), "request");
//!             Ok(())
//!         })?)
//!     })
//!     .unwrap();
//!
//! zonekit_core::microtask::drain().unwrap();
//! assert_eq!(task.run_count(), 1);
//! ```

pub mod context;
pub mod delegate;
pub mod error;
pub mod microtask;
pub mod patch;
pub mod task;
pub mod traits;

// Re-export commonly used types
pub use context::{TaskTally, Zone, ZoneId, ZoneOptions};
pub use delegate::ZoneDelegate;
pub use error::{TaskResult, ZoneError, ZoneResult};
pub use patch::{PatchRegistry, PrimitiveHandle};
pub use task::{Task, TaskCallback, TaskData, TaskId, TaskKind, TaskState};
pub use traits::{ErrorDisposition, HasTaskState, SchedulingPrimitive, ZoneSpec};

/// Library version
pub const ZONEKIT_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
