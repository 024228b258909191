// crates/threshold-ledger-core/tests/proptest_interval.rs
// ============================================================================
// Module: Interval Property-Based Tests
// Description: Property tests for interval overlap correctness.
// Purpose: Detect invariant violations across wide date ranges.
// ============================================================================

//! Property-based tests for interval invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use threshold_ledger_core::EffectiveInterval;
use time::Date;

/// Julian day range covering roughly 1995-2060, wide enough for CLO vintages.
const DAY_RANGE: std::ops::Range<i32> = 2_450_000 .. 2_474_000;

fn date_from_julian(day: i32) -> Date {
    Date::from_julian_day(day).unwrap()
}

fn interval_strategy() -> impl Strategy<Value = EffectiveInterval> {
    (DAY_RANGE, proptest::option::of(0_i32 .. 4_000)).prop_map(|(start, span)| {
        let effective = date_from_julian(start);
        let expiry = span.map(|days| date_from_julian(start + days));
        EffectiveInterval::new(effective, expiry).unwrap()
    })
}

proptest! {
    #[test]
    fn overlap_is_symmetric(a in interval_strategy(), b in interval_strategy()) {
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
    }

    #[test]
    fn interval_always_overlaps_itself(a in interval_strategy()) {
        prop_assert!(a.overlaps(&a));
    }

    #[test]
    fn shared_contained_date_implies_overlap(
        a in interval_strategy(),
        b in interval_strategy(),
        day in DAY_RANGE,
    ) {
        let date = date_from_julian(day);
        if a.contains(date) && b.contains(date) {
            prop_assert!(a.overlaps(&b));
        }
    }

    #[test]
    fn disjoint_intervals_share_no_date(
        a in interval_strategy(),
        b in interval_strategy(),
        day in DAY_RANGE,
    ) {
        let date = date_from_julian(day);
        if !a.overlaps(&b) {
            prop_assert!(!(a.contains(date) && b.contains(date)));
        }
    }

    #[test]
    fn containment_respects_effective_date(a in interval_strategy(), day in DAY_RANGE) {
        let date = date_from_julian(day);
        if a.contains(date) {
            prop_assert!(date >= a.effective);
        }
    }
}
