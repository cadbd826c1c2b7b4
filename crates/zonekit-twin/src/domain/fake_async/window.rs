//! Fake-async activation window

use super::clock::FakeClock;
use super::config::FakeAsyncConfig;
use super::error::FakeAsyncError;
use super::spec::FakeAsyncZoneSpec;
use std::cell::Cell;
use std::rc::Rc;
use tracing::debug;
use zonekit_core::{TaskResult, Zone, ZoneOptions, ZoneSpec};

/// Property key under which the fake-async zone stores its clock
pub const FAKE_ASYNC_PROPERTY: &str = "FakeAsyncTestZoneSpec";

/// Name of the zone an activation runs in
pub const FAKE_ASYNC_ZONE_NAME: &str = "fakeAsyncTestZone";

thread_local! {
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Entry point for running code against a virtual clock
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use zonekit_core::{TaskData, Zone};
/// use zonekit_twin::FakeAsync;
///
/// let fired = Rc::new(Cell::new(false));
/// let flag = Rc::clone(&fired);
/// FakeAsync::activate(|clock| {
///     Zone::current().schedule_macro_task("setTimeout", TaskData::delay(10), None, move || {
///         flag.set(true);
///         Ok(())
///     })?;
///     clock.advance(10)?;
///     Ok(())
/// })
/// .unwrap();
/// assert!(fired.get());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeAsync;

impl FakeAsync {
    /// Run `body` in a fresh fake-async zone with the default configuration
    pub fn activate<R>(body: impl FnOnce(&FakeClock) -> TaskResult<R>) -> Result<R, FakeAsyncError> {
        Self::activate_with(FakeAsyncConfig::default(), body)
    }

    /// Run `body` in a fresh fake-async zone
    ///
    /// After `body` returns, immediate work is drained (and all timers too
    /// when `flush_on_exit` is set). Pending periodic timers then fail the
    /// activation with [`FakeAsyncError::PendingPeriodicTimers`], pending
    /// one-shot timers with [`FakeAsyncError::PendingTimers`]. Leftovers are
    /// cancelled on every exit path.
    pub fn activate_with<R>(
        config: FakeAsyncConfig,
        body: impl FnOnce(&FakeClock) -> TaskResult<R>,
    ) -> Result<R, FakeAsyncError> {
        config.validate()?;
        let window = Window::open(config)?;
        let clock = window.clock.clone();

        let spec: Rc<dyn ZoneSpec> = Rc::new(FakeAsyncZoneSpec::new(clock.core()));
        let zone = Zone::current().fork(
            ZoneOptions::new(FAKE_ASYNC_ZONE_NAME)
                .shared_spec(spec)
                .property(FAKE_ASYNC_PROPERTY, clock.clone()),
        );
        debug!(zone = %zone.id(), wall_ms = clock.system_time_ms(), "fake async window opened");

        let value = zone.run(|| body(&clock))?;
        clock.drain_immediate()?;
        if clock.config().flush_on_exit {
            clock.flush()?;
        }
        clock.check_leaks()?;

        debug!(elapsed = clock.now_ms(), "fake async window closed");
        Ok(value)
    }

    /// Check if an activation is open on this thread
    pub fn is_active() -> bool {
        ACTIVE.with(Cell::get)
    }
}

/// Read the fake wall clock inside an activation, the host clock outside
pub fn system_time_ms() -> u64 {
    FakeClock::current()
        .map(|clock| clock.system_time_ms())
        .unwrap_or_else(|_| FakeClock::real_system_time_ms())
}

/// Marks the thread as inside an activation until dropped
struct Window {
    clock: FakeClock,
}

impl Window {
    fn open(config: FakeAsyncConfig) -> Result<Self, FakeAsyncError> {
        if ACTIVE.with(|active| active.replace(true)) {
            return Err(FakeAsyncError::NestedActivation);
        }
        Ok(Self {
            clock: FakeClock::new(config, FakeClock::real_system_time_ms()),
        })
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.clock.deactivate();
        ACTIVE.with(|active| active.set(false));
    }
}
