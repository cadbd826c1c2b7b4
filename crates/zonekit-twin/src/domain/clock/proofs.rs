//! Kani Proofs for VirtualClock
//!
//! The harnesses only touch the parts of the clock that need no task
//! handle: virtual time, the fake wall clock, and timer key ordering. The
//! timer index is a `BTreeMap`, so an empty clock never allocates or
//! reaches a random hasher seed.
//!
//! # Invariants
//! - Time monotonicity: `now` never decreases
//! - Wall clock: reads `base + (now - anchor)` after a rebase
//! - Timer ordering: keys sort by fire time, then insertion sequence

#[cfg(kani)]
mod kani_proofs {
    use super::super::*;

    /// Verify time never decreases, whatever the requested targets
    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_time_monotonic() {
        let mut clock = VirtualClock::new(0);

        let first: u64 = kani::any();
        let second: u64 = kani::any();

        let t0 = clock.now_ms();
        clock.advance_to(first);
        let t1 = clock.now_ms();
        kani::assert(t1 >= t0, "time must not decrease");
        kani::assert(t1 >= first, "time must reach the target");

        clock.advance_to(second);
        let t2 = clock.now_ms();
        kani::assert(t2 >= t1, "time must remain monotonic");
    }

    /// Verify an empty queue never moves time
    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_empty_pop_keeps_time() {
        let mut clock = VirtualClock::new(0);
        let start: u64 = kani::any();
        let deadline: u64 = kani::any();
        clock.advance_to(start);

        kani::assert(clock.pop_due(deadline, None).is_none(), "nothing is due");
        kani::assert(clock.now_ms() == start, "time must stay put");
    }

    /// Verify the wall clock follows virtual time after a rebase
    #[kani::proof]
    #[kani::unwind(4)]
    fn proof_wall_clock_tracks_virtual_time() {
        let base: u64 = kani::any();
        let rebased: u64 = kani::any();
        let before: u64 = kani::any();
        let after: u64 = kani::any();
        kani::assume(rebased <= u64::MAX / 2);
        kani::assume(after >= before && after - before <= u64::MAX / 2);

        let mut clock = VirtualClock::new(base);
        clock.advance_to(before);
        clock.set_system_time_ms(rebased);
        kani::assert(clock.system_time_ms() == rebased, "rebase must read back");

        clock.advance_to(after);
        kani::assert(
            clock.system_time_ms() == rebased + (after - before),
            "wall clock must advance with virtual time",
        );
    }

    /// Verify timers order by fire time first, then insertion sequence
    #[kani::proof]
    fn proof_timer_key_ordering() {
        let a = TimerKey::new(kani::any(), kani::any());
        let b = TimerKey::new(kani::any(), kani::any());

        let expected = a.fire_at < b.fire_at || (a.fire_at == b.fire_at && a.seq < b.seq);
        kani::assert((a < b) == expected, "keys must sort by (fire_at, seq)");
    }
}
