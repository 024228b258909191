// crates/threshold-ledger-store-sqlite/tests/proptest_overrides.rs
// ============================================================================
// Module: Override Store Property-Based Tests
// Description: Property tests for the non-overlap write invariant.
// Purpose: Detect invariant violations across random interval sets.
// ============================================================================

//! Property-based tests driving random interval sets through a real store:
//! whatever subset of writes the store accepts must be pairwise
//! non-overlapping, and no as-of date may ever resolve ambiguously.

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

use std::str::FromStr;

use bigdecimal::BigDecimal;
use proptest::prelude::*;
use tempfile::TempDir;
use threshold_ledger_core::AnalystId;
use threshold_ledger_core::DealId;
use threshold_ledger_core::EffectiveInterval;
use threshold_ledger_core::OverrideDraft;
use threshold_ledger_core::OverrideStore;
use threshold_ledger_core::TestCategory;
use threshold_ledger_core::TestDefinition;
use threshold_ledger_core::TestId;
use threshold_ledger_core::TestNumber;
use threshold_ledger_core::ThresholdUnit;
use threshold_ledger_store_sqlite::SqliteJournalMode;
use threshold_ledger_store_sqlite::SqliteLedgerConfig;
use threshold_ledger_store_sqlite::SqliteLedgerStore;
use time::Date;

/// Julian day range covering roughly 2010-2032.
const DAY_RANGE: std::ops::Range<i32> = 2_455_000 .. 2_463_000;

fn date_from_julian(day: i32) -> Date {
    Date::from_julian_day(day).unwrap()
}

fn interval_strategy() -> impl Strategy<Value = EffectiveInterval> {
    (DAY_RANGE, proptest::option::of(0_i32 .. 2_000)).prop_map(|(start, span)| {
        let effective = date_from_julian(start);
        let expiry = span.map(|days| date_from_julian(start + days));
        EffectiveInterval::new(effective, expiry).unwrap()
    })
}

fn open_seeded_store(dir: &TempDir) -> SqliteLedgerStore {
    let config = SqliteLedgerConfig {
        path: dir.path().join("ledger.sqlite3"),
        busy_timeout_ms: 5_000,
        journal_mode: SqliteJournalMode::Wal,
        sync_mode: threshold_ledger_store_sqlite::SqliteSyncMode::Normal,
        read_pool_size: 1,
    };
    let store = SqliteLedgerStore::new(&config).expect("open store");
    store
        .seed_catalog(&[TestDefinition {
            test_id: TestId::from_raw(34).unwrap(),
            test_number: TestNumber::new(34),
            name: "Minimum Weighted Average Coupon".to_string(),
            category: TestCategory::WeightedAverage,
            default_threshold: BigDecimal::from_str("0.07").unwrap(),
            unit: ThresholdUnit::Ratio,
        }])
        .expect("seed catalog");
    store
}

fn draft_for(interval: EffectiveInterval) -> OverrideDraft {
    OverrideDraft {
        deal_id: DealId::new("MAG7"),
        test_id: TestId::from_raw(34).unwrap(),
        value: BigDecimal::from_str("0.065").unwrap(),
        interval,
        note: None,
        created_by: AnalystId::new("proptest"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn accepted_intervals_are_pairwise_disjoint(
        intervals in proptest::collection::vec(interval_strategy(), 1 .. 12),
    ) {
        let dir = TempDir::new().unwrap();
        let store = open_seeded_store(&dir);
        let mut accepted = Vec::new();
        for interval in intervals {
            if store.upsert_override(&draft_for(interval)).is_ok() {
                accepted.push(interval);
            }
        }
        for (index, first) in accepted.iter().enumerate() {
            for second in accepted.iter().skip(index + 1) {
                prop_assert!(
                    !first.overlaps(second),
                    "store accepted overlapping intervals {first} and {second}"
                );
            }
        }
    }

    #[test]
    fn no_as_of_date_resolves_ambiguously(
        intervals in proptest::collection::vec(interval_strategy(), 1 .. 12),
        probe in DAY_RANGE,
    ) {
        let dir = TempDir::new().unwrap();
        let store = open_seeded_store(&dir);
        let mut accepted = Vec::new();
        for interval in intervals {
            if store.upsert_override(&draft_for(interval)).is_ok() {
                accepted.push(interval);
            }
        }
        let as_of = date_from_julian(probe);
        let active = store
            .get_active_override(&DealId::new("MAG7"), TestId::from_raw(34).unwrap(), as_of);
        prop_assert!(active.is_ok(), "active lookup failed: {:?}", active.err());
        let containing = accepted.iter().filter(|interval| interval.contains(as_of)).count();
        prop_assert!(containing <= 1);
        prop_assert_eq!(active.unwrap().is_some(), containing == 1);
    }
}
