//! Fake Async Integration Tests
//!
//! Drive the virtual clock through the public API only: tasks are scheduled
//! through the current zone (or a patch registry) exactly as production
//! code would, and the clock decides when they fire.

use anyhow::bail;
use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use zonekit_core::*;
use zonekit_twin::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("zonekit_twin=trace,zonekit_core=debug")
        .try_init();
}

fn set_timeout(delay_ms: u64, f: impl FnMut() -> TaskResult + 'static) -> ZoneResult<Task> {
    Zone::current().schedule_macro_task("setTimeout", TaskData::delay(delay_ms), None, f)
}

fn set_interval(interval_ms: u64, f: impl FnMut() -> TaskResult + 'static) -> ZoneResult<Task> {
    Zone::current().schedule_periodic_task("setInterval", TaskData::delay(interval_ms), None, f)
}

fn queue_microtask(f: impl FnMut() -> TaskResult + 'static) -> ZoneResult<Task> {
    Zone::current().schedule_micro_task("queueMicrotask", f)
}

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn push(log: &Log, entry: impl Into<String>) {
    log.borrow_mut().push(entry.into());
}

// ============================================================================
// Scenarios
// ============================================================================

mod scenarios {
    use super::*;

    #[test]
    fn one_shot_fires_once_at_its_time() {
        init_tracing();
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        FakeAsync::activate(|clock| {
            let start = clock.now_ms();
            set_timeout(10, move || {
                counter.set(counter.get() + 1);
                Ok(())
            })?;
            clock.advance(10)?;
            assert_eq!(clock.now_ms(), start + 10);
            Ok(())
        })
        .unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn one_shot_waits_for_its_full_delay() {
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        FakeAsync::activate(|clock| {
            set_timeout(10, move || {
                flag.set(true);
                Ok(())
            })?;
            clock.advance(6)?;
            assert!(!fired.get());
            clock.advance(6)?;
            assert!(fired.get());
            assert_eq!(clock.now_ms(), 12);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn periodic_fires_per_interval_and_can_be_discarded() {
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&ticks);
        FakeAsync::activate(|clock| {
            let clock_in_task = clock.clone();
            set_interval(10, move || {
                sink.borrow_mut().push(clock_in_task.now_ms());
                Ok(())
            })?;
            clock.advance(35)?;
            assert_eq!(*ticks.borrow(), vec![10, 20, 30]);
            assert_eq!(clock.task_count(TaskKind::Periodic)?, 1);

            clock.advance(5)?;
            assert_eq!(ticks.borrow().len(), 4);

            assert_eq!(clock.discard_periodic()?, 1);
            assert_eq!(clock.task_count(TaskKind::Periodic)?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn immediate_work_drains_to_fixpoint_in_order() {
        let order = log();
        let outer = Rc::clone(&order);
        FakeAsync::activate(|clock| {
            queue_microtask(move || {
                push(&outer, "first");
                let inner = Rc::clone(&outer);
                queue_microtask(move || {
                    push(&inner, "second");
                    Ok(())
                })?;
                Ok(())
            })?;
            assert_eq!(clock.drain_immediate()?, 2);
            assert_eq!(clock.task_count(TaskKind::Micro)?, 0);
            Ok(())
        })
        .unwrap();
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn unconsumed_timer_fails_the_window() {
        let handle = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&handle);
        let err = FakeAsync::activate(|_| {
            *slot.borrow_mut() = Some(set_timeout(10, || Ok(()))?);
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(err, FakeAsyncError::PendingTimers(1)));
        assert!(err.is_leak());
        assert_eq!(err.to_string(), "1 timer(s) still in the queue.");
        let task = handle.borrow_mut().take().unwrap();
        assert_eq!(task.state(), TaskState::Cancelled);
        assert_eq!(task.run_count(), 0);
    }

    #[test]
    fn failing_task_stops_advance_but_not_later_tasks() {
        let later = Rc::new(Cell::new(false));
        let flag = Rc::clone(&later);
        FakeAsync::activate(|clock| {
            set_timeout(5, || bail!("task A failed"))?;
            set_timeout(10, move || {
                flag.set(true);
                Ok(())
            })?;

            let err = clock.advance(20).unwrap_err();
            assert!(matches!(err, FakeAsyncError::Callback(_)));
            assert_eq!(err.to_string(), "task A failed");
            assert_eq!(clock.now_ms(), 5);
            assert!(!later.get());

            clock.advance(5)?;
            assert!(later.get());
            Ok(())
        })
        .unwrap();
    }
}

// ============================================================================
// Ordering and propagation
// ============================================================================

mod ordering {
    use super::*;

    #[test]
    fn advance_zero_fires_only_due_timers() {
        let order = log();
        let (a, b, c) = (Rc::clone(&order), Rc::clone(&order), Rc::clone(&order));
        FakeAsync::activate(|clock| {
            set_timeout(1, move || {
                push(&a, "later");
                Ok(())
            })?;
            set_timeout(0, move || {
                push(&b, "now");
                Ok(())
            })?;
            queue_microtask(move || {
                push(&c, "micro");
                Ok(())
            })?;

            clock.advance(0)?;
            assert_eq!(*order.borrow(), vec!["micro", "now"]);
            assert_eq!(clock.now_ms(), 0);
            clock.advance(1)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(*order.borrow(), vec!["micro", "now", "later"]);
    }

    #[test]
    fn immediate_work_runs_before_timers_at_the_same_instant() {
        let order = log();
        let trigger = Rc::clone(&order);
        let sibling = Rc::clone(&order);
        FakeAsync::activate(|clock| {
            set_timeout(10, move || {
                push(&trigger, "timer");
                let micro = Rc::clone(&trigger);
                queue_microtask(move || {
                    push(&micro, "micro");
                    Ok(())
                })?;
                let zero = Rc::clone(&trigger);
                set_timeout(0, move || {
                    push(&zero, "zero-delay");
                    Ok(())
                })?;
                Ok(())
            })?;
            set_timeout(10, move || {
                push(&sibling, "sibling");
                Ok(())
            })?;
            clock.advance(10)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            *order.borrow(),
            vec!["timer", "micro", "sibling", "zero-delay"]
        );
    }

    #[test]
    fn tasks_run_in_the_zone_that_scheduled_them() {
        let seen = log();
        let sink = Rc::clone(&seen);
        FakeAsync::activate(|clock| {
            let child = Zone::current().fork(ZoneOptions::new("child").property("request", 9_u32));
            child.run(|| {
                set_timeout(3, move || {
                    let zone = Zone::current();
                    let request = zone.get::<u32>("request").map(|id| *id).unwrap_or_default();
                    push(&sink, format!("{}#{}", zone.name(), request));
                    Ok(())
                })?;
                Ok(())
            })?;
            assert_eq!(Zone::current().name(), FAKE_ASYNC_ZONE_NAME);
            clock.advance(3)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(*seen.borrow(), vec!["child#9"]);
    }

    #[test]
    fn deferred_work_waits_when_not_processed_synchronously() {
        let order = log();
        let first = Rc::clone(&order);
        FakeAsync::activate(|clock| {
            set_timeout(5, move || {
                push(&first, "pending-at-start");
                let nested = Rc::clone(&first);
                set_timeout(2, move || {
                    push(&nested, "scheduled-during-advance");
                    Ok(())
                })?;
                Ok(())
            })?;

            clock.advance_with(
                10,
                AdvanceOptions {
                    process_new_work_synchronously: false,
                },
            )?;
            assert_eq!(*order.borrow(), vec!["pending-at-start"]);
            assert_eq!(clock.now_ms(), 10);

            clock.advance(0)?;
            assert_eq!(order.borrow().len(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn zero_interval_is_clamped_to_one_millisecond() {
        let ticks = Rc::new(Cell::new(0));
        let counter = Rc::clone(&ticks);
        FakeAsync::activate(|clock| {
            set_interval(0, move || {
                counter.set(counter.get() + 1);
                Ok(())
            })?;
            clock.advance(3)?;
            clock.discard_periodic()?;
            Ok(())
        })
        .unwrap();
        assert_eq!(ticks.get(), 3);
    }
}

// ============================================================================
// Cancellation and errors
// ============================================================================

mod cancellation {
    use super::*;

    #[test]
    fn periodic_cancelling_itself_is_not_rearmed() {
        let handle: Rc<RefCell<Option<Task>>> = Rc::new(RefCell::new(None));
        let me = Rc::clone(&handle);
        FakeAsync::activate(|clock| {
            let task = set_interval(10, move || {
                if let Some(task) = me.borrow().as_ref() {
                    task.cancel()?;
                }
                Ok(())
            })?;
            *handle.borrow_mut() = Some(task.clone());

            clock.advance(50)?;
            assert_eq!(task.run_count(), 1);
            assert_eq!(task.state(), TaskState::Cancelled);
            assert_eq!(clock.task_count(TaskKind::Periodic)?, 0);
            Ok(())
        })
        .unwrap();
        handle.borrow_mut().take();
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        FakeAsync::activate(|clock| {
            let task = set_timeout(5, move || {
                flag.set(true);
                Ok(())
            })?;
            task.cancel()?;
            assert_eq!(clock.task_count(TaskKind::OneShot)?, 0);
            clock.advance(10)?;
            Ok(())
        })
        .unwrap();
        assert!(!fired.get());
    }

    #[test]
    fn timer_can_cancel_a_later_timer() {
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        FakeAsync::activate(|clock| {
            let victim = set_timeout(10, move || {
                flag.set(true);
                Ok(())
            })?;
            set_timeout(5, move || {
                victim.cancel()?;
                Ok(())
            })?;
            clock.advance(20)?;
            Ok(())
        })
        .unwrap();
        assert!(!fired.get());
    }

    #[test]
    fn failing_periodic_is_retired() {
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        FakeAsync::activate(|clock| {
            let task = set_interval(10, move || {
                counter.set(counter.get() + 1);
                bail!("interval failed")
            })?;
            assert!(clock.advance(10).is_err());
            assert_eq!(task.state(), TaskState::Cancelled);
            clock.advance(50)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn handled_errors_do_not_stop_the_clock() {
        struct Swallow(Rc<Cell<usize>>);

        impl ZoneSpec for Swallow {
            fn on_handle_error(
                &self,
                _parent: &ZoneDelegate,
                _current: &Zone,
                _target: &Zone,
                _error: &anyhow::Error,
            ) -> ErrorDisposition {
                self.0.set(self.0.get() + 1);
                ErrorDisposition::Handled
            }
        }

        let handled = Rc::new(Cell::new(0));
        let spec = Swallow(Rc::clone(&handled));
        FakeAsync::activate(move |clock| {
            let guarded = Zone::current().fork(ZoneOptions::new("guarded").spec(spec));
            guarded.run(|| {
                set_timeout(1, || bail!("contained"))?;
                Ok(())
            })?;
            clock.advance(1)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(handled.get(), 1);
    }

    #[test]
    fn body_error_cancels_leftovers() {
        let handle = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&handle);
        let err = FakeAsync::activate(|_| -> TaskResult<()> {
            *slot.borrow_mut() = Some(set_interval(10, || Ok(()))?);
            bail!("body failed")
        })
        .unwrap_err();

        assert!(matches!(err, FakeAsyncError::Callback(_)));
        let task = handle.borrow_mut().take().unwrap();
        assert_eq!(task.state(), TaskState::Cancelled);
        assert!(!FakeAsync::is_active());
        assert_eq!(Zone::root().task_tally(), TaskTally::default());
    }

    #[test]
    fn rejected_source_cannot_be_scheduled() {
        FakeAsync::activate(|_| {
            let err = Zone::current()
                .schedule_macro_task("XMLHttpRequest.send", TaskData::default(), None, || Ok(()))
                .unwrap_err();
            assert!(matches!(err, ZoneError::Rejected { .. }));
            assert!(!err.is_usage_error());
            Ok(())
        })
        .unwrap();
    }
}

// ============================================================================
// Draining
// ============================================================================

mod draining {
    use super::*;

    fn poll(count: Rc<Cell<u32>>) -> TaskResult {
        count.set(count.get() + 1);
        set_timeout(10, move || poll(Rc::clone(&count)))?;
        Ok(())
    }

    #[test]
    fn drain_all_runs_chained_timers() {
        let order = log();
        let first = Rc::clone(&order);
        let elapsed = FakeAsync::activate(|clock| {
            set_timeout(10, move || {
                push(&first, "a");
                let second = Rc::clone(&first);
                set_timeout(15, move || {
                    push(&second, "b");
                    Ok(())
                })?;
                Ok(())
            })?;
            Ok(clock.drain_all(20)?)
        })
        .unwrap();
        assert_eq!(elapsed, 25);
        assert_eq!(*order.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn drain_all_gives_up_on_polling_timers() {
        let polls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&polls);
        FakeAsync::activate(|clock| {
            poll(counter)?;
            let err = clock.drain_all(5).unwrap_err();
            assert!(matches!(err, FakeAsyncError::FlushLimitExceeded { limit: 5 }));
            clock.discard_all()?;
            Ok(())
        })
        .unwrap();
        assert_eq!(polls.get(), 6);
    }

    #[test]
    fn periodic_timers_do_not_keep_drain_all_alive() {
        let ticks = Rc::new(Cell::new(0));
        let counter = Rc::clone(&ticks);
        FakeAsync::activate(|clock| {
            set_interval(10, move || {
                counter.set(counter.get() + 1);
                Ok(())
            })?;
            set_timeout(25, || Ok(()))?;
            assert_eq!(clock.drain_all(20)?, 25);
            assert_eq!(clock.task_count(TaskKind::Periodic)?, 1);
            clock.discard_periodic()?;
            Ok(())
        })
        .unwrap();
        assert_eq!(ticks.get(), 2);
    }

    #[test]
    fn drain_periodic_runs_through_last_pending_time() {
        let ticks = Rc::new(Cell::new(0));
        let counter = Rc::clone(&ticks);
        FakeAsync::activate(|clock| {
            set_interval(10, move || {
                counter.set(counter.get() + 1);
                Ok(())
            })?;
            set_timeout(30, || Ok(()))?;
            assert_eq!(clock.drain_periodic()?, 30);
            clock.discard_all()?;
            Ok(())
        })
        .unwrap();
        assert_eq!(ticks.get(), 3);
    }

    #[test]
    fn advance_through_pending_defers_new_work() {
        let order = log();
        let early = Rc::clone(&order);
        let late = Rc::clone(&order);
        FakeAsync::activate(|clock| {
            set_timeout(5, move || {
                push(&early, "5");
                let spawned = Rc::clone(&early);
                set_timeout(5, move || {
                    push(&spawned, "spawned");
                    Ok(())
                })?;
                Ok(())
            })?;
            set_timeout(20, move || {
                push(&late, "20");
                Ok(())
            })?;

            assert_eq!(clock.advance_through_pending()?, 20);
            assert_eq!(*order.borrow(), vec!["5", "20"]);
            clock.advance(0)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(*order.borrow(), vec!["5", "20", "spawned"]);
    }

    #[test]
    fn advance_to_next_counts_distinct_times() {
        let fired = Rc::new(Cell::new(0));
        FakeAsync::activate(|clock| {
            for delay in [10, 10, 30] {
                let counter = Rc::clone(&fired);
                set_timeout(delay, move || {
                    counter.set(counter.get() + 1);
                    Ok(())
                })?;
            }
            assert_eq!(clock.advance_to_next(5)?, 0);
            assert_eq!(clock.now_ms(), 0);

            assert_eq!(clock.advance_to_next(2)?, 30);
            assert_eq!(fired.get(), 3);
            Ok(())
        })
        .unwrap();
    }
}

// ============================================================================
// Exit contract and configuration
// ============================================================================

mod exit_contract {
    use super::*;

    #[test]
    fn periodic_leak_is_reported_first() {
        let err = FakeAsync::activate(|_| {
            set_timeout(10, || Ok(()))?;
            set_interval(10, || Ok(()))?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, FakeAsyncError::PendingPeriodicTimers(1)));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn leak_report_logs_both_kinds() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let err = tracing::subscriber::with_default(subscriber, || {
            FakeAsync::activate(|_| {
                set_interval(10, || Ok(()))?;
                set_timeout(5, || Ok(()))?;
                set_timeout(20, || Ok(()))?;
                Ok(())
            })
            .unwrap_err()
        });

        assert!(matches!(err, FakeAsyncError::PendingPeriodicTimers(1)));
        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("periodic=1"), "{output}");
        assert!(output.contains("one_shot=2"), "{output}");
    }

    #[test]
    fn pending_immediate_work_runs_on_exit() {
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        FakeAsync::activate(|_| {
            queue_microtask(move || {
                flag.set(true);
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
        assert!(ran.get());
    }

    #[test]
    fn flush_on_exit_drains_timers() {
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let config = FakeAsyncConfig::new().with_flush_on_exit(true);
        FakeAsync::activate_with(config, |_| {
            set_timeout(100, move || {
                flag.set(true);
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();
        assert!(ran.get());
    }

    #[test]
    fn animation_frames_are_untracked_by_default() {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&frames);
        FakeAsync::activate(|clock| {
            let clock_in_task = clock.clone();
            Zone::current().schedule_macro_task(
                "requestAnimationFrame",
                TaskData::default(),
                None,
                move || {
                    sink.borrow_mut().push(clock_in_task.now_ms());
                    Ok(())
                },
            )?;
            let counts = clock.task_counts()?;
            assert_eq!(counts.untracked, 1);
            clock.advance(16)?;
            // a second frame left pending does not fail the window
            Zone::current().schedule_macro_task(
                "requestAnimationFrame",
                TaskData::default(),
                None,
                || Ok(()),
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(*frames.borrow(), vec![16]);
    }

    #[test]
    fn tracked_animation_frames_count_as_leaks() {
        let config = FakeAsyncConfig::new().with_tracked_animation_frames(true);
        let err = FakeAsync::activate_with(config, |_| {
            Zone::current().schedule_macro_task(
                "webkitRequestAnimationFrame",
                TaskData::default(),
                None,
                || Ok(()),
            )?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, FakeAsyncError::PendingTimers(1)));
    }

    #[test]
    fn config_loaded_from_json_applies() {
        let config = FakeAsyncConfig::from_json(r#"{ "rejected_sources": ["fetch"] }"#).unwrap();
        FakeAsync::activate_with(config, |_| {
            let err = Zone::current()
                .schedule_macro_task("fetch", TaskData::default(), None, || Ok(()))
                .unwrap_err();
            assert!(matches!(err, ZoneError::Rejected { .. }));
            // replacing the list lifts the default rejection
            Zone::current()
                .schedule_macro_task("XMLHttpRequest.send", TaskData::delay(1), None, || Ok(()))?;
            FakeClock::current()?.advance(1)?;
            Ok(())
        })
        .unwrap();
    }
}

// ============================================================================
// Patch registry under a virtual clock
// ============================================================================

mod patched {
    use super::*;

    #[derive(Default)]
    struct HostTimer {
        armed: Cell<usize>,
    }

    impl SchedulingPrimitive for HostTimer {
        fn arm(&self, _task: &Task) -> ZoneResult<()> {
            self.armed.set(self.armed.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn patched_primitive_is_diverted_to_the_virtual_clock() {
        init_tracing();
        let host = Rc::new(HostTimer::default());
        let registry = Rc::new(PatchRegistry::new());
        assert!(registry.install("setTimeout", TaskKind::OneShot, host.clone()));
        assert!(!registry.install("setTimeout", TaskKind::OneShot, host.clone()));

        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        FakeAsync::activate(|clock| {
            registry.schedule(
                "setTimeout",
                move || {
                    counter.set(counter.get() + 1);
                    Ok(())
                },
                TaskData::delay(10),
            )?;
            assert_eq!(clock.task_count(TaskKind::OneShot)?, 1);
            clock.advance(10)?;
            Ok(())
        })
        .unwrap();

        assert_eq!(fired.get(), 1);
        assert_eq!(host.armed.get(), 0);

        // outside the window the host primitive is armed again
        registry
            .schedule("setTimeout", || Ok(()), TaskData::delay(10))
            .unwrap();
        assert_eq!(host.armed.get(), 1);
    }

    #[test]
    fn wall_clock_follows_virtual_time() {
        FakeAsync::activate(|clock| {
            let start = system_time_ms();
            clock.advance(1_000)?;
            assert_eq!(system_time_ms(), start + 1_000);
            assert!(FakeClock::real_system_time_ms() >= start);
            Ok(())
        })
        .unwrap();
    }
}
