//! Domain Layer
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Clock Module                  Fake Async Module            │
//! │  ├─ VirtualClock               ├─ FakeAsync (activation)    │
//! │  ├─ TimerQueue                 ├─ FakeClock (driver)        │
//! │  └─ PendingTimer / TimerKey    ├─ FakeAsyncZoneSpec (hooks) │
//! │                                └─ FakeAsyncConfig           │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The clock module is plain bookkeeping and never calls user code; the
//! fake async module owns every call into a task.

pub mod clock;
pub mod fake_async;

pub use clock::{TaskCounts, VirtualClock, VirtualTimeMs};
pub use fake_async::{
    system_time_ms, AdvanceOptions, ConfigError, FakeAsync, FakeAsyncConfig, FakeAsyncError,
    FakeAsyncZoneSpec, FakeClock, FAKE_ASYNC_PROPERTY, FAKE_ASYNC_ZONE_NAME,
};
