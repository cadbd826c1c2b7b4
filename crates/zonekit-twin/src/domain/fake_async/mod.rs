//! Fake Async Module
//!
//! # Design
//!
//! An activation forks a dedicated zone whose [`FakeAsyncZoneSpec`]
//! diverts every scheduled task into the [`VirtualClock`] of that
//! activation. The test then drives time explicitly through the
//! [`FakeClock`] handle:
//!
//! ```text
//!   FakeAsync::activate(|clock| { … })
//!     │
//!     ├─ fork "fakeAsyncTestZone" (spec + clock property)
//!     ├─ run body in that zone
//!     │     schedule ──▶ FakeAsyncZoneSpec ──▶ VirtualClock queues
//!     │     clock.advance(ms) ──▶ pop ──▶ task.invoke() in its own zone
//!     ├─ drain immediate work (and all timers if flush_on_exit)
//!     └─ leak check: periodic first, then one-shot
//! ```
//!
//! One activation per thread; a nested one fails fast.
//!
//! [`VirtualClock`]: crate::domain::clock::VirtualClock

mod clock;
mod config;
mod error;
mod spec;
mod window;

pub use clock::{AdvanceOptions, FakeClock};
pub use config::{
    ConfigError, FakeAsyncConfig, ANIMATION_FRAME_SOURCES, DEFAULT_ANIMATION_FRAME_MS,
    DEFAULT_FLUSH_LIMIT, DEFAULT_REJECTED_SOURCES,
};
pub use error::FakeAsyncError;
pub use spec::FakeAsyncZoneSpec;
pub use window::{system_time_ms, FakeAsync, FAKE_ASYNC_PROPERTY, FAKE_ASYNC_ZONE_NAME};
