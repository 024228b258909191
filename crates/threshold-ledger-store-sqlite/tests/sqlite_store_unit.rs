// crates/threshold-ledger-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Ledger Store Unit Tests
// Description: Targeted tests for seeding, strict reads, and write invariants.
// Purpose: Validate catalog immutability and the non-overlap invariant.
// ============================================================================

//! ## Overview
//! Unit-level tests for [`SqliteLedgerStore`]:
//! - Catalog seeding is idempotent and referenced entries are immutable.
//! - `get_applicable_tests` is strict about unknown test numbers.
//! - Override writes reject interval collisions atomically, including under
//!   concurrent writers.
//! - Stored data that violates the non-overlap invariant fails closed.

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

use std::collections::BTreeSet;
use std::str::FromStr;
use std::thread;

use bigdecimal::BigDecimal;
use tempfile::TempDir;
use threshold_ledger_core::AnalystId;
use threshold_ledger_core::CatalogError;
use threshold_ledger_core::CatalogStore;
use threshold_ledger_core::DealId;
use threshold_ledger_core::EffectiveInterval;
use threshold_ledger_core::OverrideDraft;
use threshold_ledger_core::OverrideError;
use threshold_ledger_core::OverrideStore;
use threshold_ledger_core::TestCategory;
use threshold_ledger_core::TestDefinition;
use threshold_ledger_core::TestId;
use threshold_ledger_core::TestNumber;
use threshold_ledger_core::ThresholdUnit;
use threshold_ledger_store_sqlite::SqliteLedgerConfig;
use threshold_ledger_store_sqlite::SqliteLedgerStore;
use time::macros::date;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a store config rooted in the given temp dir.
fn store_config(dir: &TempDir) -> SqliteLedgerConfig {
    SqliteLedgerConfig {
        path: dir.path().join("ledger.sqlite3"),
        busy_timeout_ms: 5_000,
        journal_mode: threshold_ledger_store_sqlite::SqliteJournalMode::Wal,
        sync_mode: threshold_ledger_store_sqlite::SqliteSyncMode::Full,
        read_pool_size: 2,
    }
}

fn decimal(text: &str) -> BigDecimal {
    BigDecimal::from_str(text).unwrap()
}

fn definition(
    id: u64,
    number: u32,
    name: &str,
    category: TestCategory,
    threshold: &str,
    unit: ThresholdUnit,
) -> TestDefinition {
    TestDefinition {
        test_id: TestId::from_raw(id).unwrap(),
        test_number: TestNumber::new(number),
        name: name.to_string(),
        category,
        default_threshold: decimal(threshold),
        unit,
    }
}

fn sample_catalog() -> Vec<TestDefinition> {
    vec![
        definition(
            1,
            1,
            "Minimum Senior Secured Loans",
            TestCategory::Collateral,
            "0.90",
            ThresholdUnit::Ratio,
        ),
        definition(
            34,
            34,
            "Minimum Weighted Average Coupon",
            TestCategory::WeightedAverage,
            "0.07",
            ThresholdUnit::Ratio,
        ),
        definition(
            40,
            40,
            "Maximum Cov-Lite Loans",
            TestCategory::Collateral,
            "0.60",
            ThresholdUnit::Ratio,
        ),
    ]
}

fn seeded_store(dir: &TempDir) -> SqliteLedgerStore {
    let store = SqliteLedgerStore::new(&store_config(dir)).expect("open store");
    store.seed_catalog(&sample_catalog()).expect("seed catalog");
    store
}

fn draft(deal: &str, test: u64, value: &str, interval: EffectiveInterval) -> OverrideDraft {
    OverrideDraft {
        deal_id: DealId::new(deal),
        test_id: TestId::from_raw(test).unwrap(),
        value: decimal(value),
        interval,
        note: None,
        created_by: AnalystId::new("tester"),
    }
}

fn numbers(values: &[u32]) -> BTreeSet<TestNumber> {
    values.iter().copied().map(TestNumber::new).collect()
}

// ============================================================================
// SECTION: Catalog Seeding
// ============================================================================

#[test]
fn seed_catalog_inserts_then_skips_identical_entries() {
    let dir = TempDir::new().unwrap();
    let store = SqliteLedgerStore::new(&store_config(&dir)).expect("open store");
    let first = store.seed_catalog(&sample_catalog()).expect("first seed");
    assert_eq!(first, 3);
    let second = store.seed_catalog(&sample_catalog()).expect("second seed");
    assert_eq!(second, 0);
    let loaded = store.get_test(TestId::from_raw(34).unwrap()).expect("get_test");
    assert_eq!(loaded.unwrap().default_threshold, decimal("0.07"));
}

#[test]
fn seed_catalog_updates_entry_with_no_override_references() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let mut catalog = sample_catalog();
    catalog[0].name = "Minimum Senior Secured Loans (Amended)".to_string();
    let written = store.seed_catalog(&catalog).expect("reseed");
    assert_eq!(written, 1);
    let loaded = store.get_test(TestId::from_raw(1).unwrap()).expect("get_test").unwrap();
    assert_eq!(loaded.name, "Minimum Senior Secured Loans (Amended)");
}

#[test]
fn seed_catalog_rejects_change_to_referenced_entry() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    store
        .upsert_override(&draft(
            "MAG17",
            1,
            "0.875",
            EffectiveInterval::open_ended(date!(2016 - 03 - 23)),
        ))
        .expect("upsert");
    let mut catalog = sample_catalog();
    catalog[0].default_threshold = decimal("0.85");
    let result = store.seed_catalog(&catalog);
    assert!(result.is_err(), "referenced catalog entry must be immutable");
}

// ============================================================================
// SECTION: Catalog Reads
// ============================================================================

#[test]
fn get_applicable_tests_returns_requested_subset() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let tests = store.get_applicable_tests(&numbers(&[1, 40])).expect("applicable tests");
    assert_eq!(tests.len(), 2);
    assert!(tests.contains_key(&TestId::from_raw(1).unwrap()));
    assert!(tests.contains_key(&TestId::from_raw(40).unwrap()));
}

#[test]
fn get_applicable_tests_is_strict_about_unknown_numbers() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let result = store.get_applicable_tests(&numbers(&[1, 77, 88]));
    let Err(CatalogError::NotFound {
        test_numbers,
    }) = result
    else {
        panic!("expected NotFound for unknown test numbers");
    };
    assert_eq!(test_numbers, vec![TestNumber::new(77), TestNumber::new(88)]);
}

// ============================================================================
// SECTION: Override Writes
// ============================================================================

#[test]
fn upsert_rejects_overlapping_open_ended_interval() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    store
        .upsert_override(&draft(
            "MAG7",
            34,
            "0.065",
            EffectiveInterval::open_ended(date!(2012 - 01 - 01)),
        ))
        .expect("first upsert");
    let result = store.upsert_override(&draft(
        "MAG7",
        34,
        "0.0675",
        EffectiveInterval::open_ended(date!(2012 - 06 - 01)),
    ));
    let Err(OverrideError::Overlap {
        deal_id,
        ..
    }) = result
    else {
        panic!("expected overlap rejection");
    };
    assert_eq!(deal_id, DealId::new("MAG7"));
}

#[test]
fn upsert_accepts_adjacent_intervals() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let closed =
        EffectiveInterval::new(date!(2012 - 01 - 01), Some(date!(2012 - 05 - 31))).unwrap();
    store.upsert_override(&draft("MAG7", 34, "0.065", closed)).expect("closed upsert");
    store
        .upsert_override(&draft(
            "MAG7",
            34,
            "0.0675",
            EffectiveInterval::open_ended(date!(2012 - 06 - 01)),
        ))
        .expect("adjacent open-ended upsert");
    let rows = store.list_deal_overrides(&DealId::new("MAG7")).expect("list");
    assert_eq!(rows.len(), 2);
}

#[test]
fn upsert_rejects_unknown_test() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let result = store.upsert_override(&draft(
        "MAG17",
        999,
        "0.5",
        EffectiveInterval::open_ended(date!(2016 - 01 - 01)),
    ));
    assert!(matches!(result, Err(OverrideError::Invalid { .. })));
}

#[test]
fn concurrent_upserts_for_same_key_have_one_winner() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let handles: Vec<_> = (0 .. 4)
        .map(|attempt| {
            let store = store.clone();
            thread::spawn(move || {
                store.upsert_override(&draft(
                    "MAG17",
                    1,
                    &format!("0.8{attempt}"),
                    EffectiveInterval::open_ended(date!(2016 - 03 - 23)),
                ))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent writer must win");
    for result in results {
        if let Err(err) = result {
            assert!(matches!(err, OverrideError::Overlap { .. }));
        }
    }
}

// ============================================================================
// SECTION: Override Reads
// ============================================================================

#[test]
fn get_active_override_picks_the_containing_interval() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let closed =
        EffectiveInterval::new(date!(2012 - 01 - 01), Some(date!(2012 - 05 - 31))).unwrap();
    store.upsert_override(&draft("MAG7", 34, "0.065", closed)).expect("closed upsert");
    store
        .upsert_override(&draft(
            "MAG7",
            34,
            "0.0675",
            EffectiveInterval::open_ended(date!(2012 - 06 - 01)),
        ))
        .expect("open-ended upsert");

    let deal = DealId::new("MAG7");
    let test = TestId::from_raw(34).unwrap();
    let before = store.get_active_override(&deal, test, date!(2011 - 12 - 31)).expect("before");
    assert!(before.is_none());
    let first = store.get_active_override(&deal, test, date!(2012 - 03 - 15)).expect("first");
    assert_eq!(first.unwrap().value, decimal("0.065"));
    let second = store.get_active_override(&deal, test, date!(2020 - 01 - 01)).expect("second");
    assert_eq!(second.unwrap().value, decimal("0.0675"));
}

#[test]
fn overlapping_stored_rows_fail_closed_as_ambiguous() {
    let dir = TempDir::new().unwrap();
    let config = store_config(&dir);
    let store = SqliteLedgerStore::new(&config).expect("open store");
    store.seed_catalog(&sample_catalog()).expect("seed");

    // Bypass the store's overlap check to simulate damaged data.
    let raw = rusqlite::Connection::open(&config.path).expect("raw connection");
    raw.execute(
        "INSERT INTO deal_threshold_overrides (deal_id, test_id, threshold_value, \
         effective_date, expiry_date, note, created_by, created_at) VALUES ('MAG7', 34, '0.065', \
         '2012-01-01', NULL, NULL, 'raw', 0)",
        [],
    )
    .expect("first raw insert");
    raw.execute(
        "INSERT INTO deal_threshold_overrides (deal_id, test_id, threshold_value, \
         effective_date, expiry_date, note, created_by, created_at) VALUES ('MAG7', 34, '0.07', \
         '2012-03-01', '2012-12-31', NULL, 'raw', 0)",
        [],
    )
    .expect("second raw insert");

    let result = store.get_active_override(
        &DealId::new("MAG7"),
        TestId::from_raw(34).unwrap(),
        date!(2012 - 06 - 01),
    );
    let Err(OverrideError::Ambiguous {
        count,
        ..
    }) = result
    else {
        panic!("expected ambiguous override error");
    };
    assert_eq!(count, 2);
}

#[test]
fn list_deal_overrides_orders_by_test_number_then_effective_date() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    store
        .upsert_override(&draft(
            "MAG17",
            40,
            "0.65",
            EffectiveInterval::open_ended(date!(2016 - 06 - 01)),
        ))
        .expect("test 40 upsert");
    let closed =
        EffectiveInterval::new(date!(2016 - 01 - 01), Some(date!(2016 - 03 - 22))).unwrap();
    store.upsert_override(&draft("MAG17", 1, "0.92", closed)).expect("test 1 early upsert");
    store
        .upsert_override(&draft(
            "MAG17",
            1,
            "0.90",
            EffectiveInterval::open_ended(date!(2016 - 03 - 23)),
        ))
        .expect("test 1 late upsert");

    let rows = store.list_deal_overrides(&DealId::new("MAG17")).expect("list");
    let keys: Vec<_> = rows
        .iter()
        .map(|row| (row.test_id.get(), row.interval.effective))
        .collect();
    assert_eq!(keys, vec![
        (1, date!(2016 - 01 - 01)),
        (1, date!(2016 - 03 - 23)),
        (40, date!(2016 - 06 - 01)),
    ]);
}

// ============================================================================
// SECTION: Bulk Replacement
// ============================================================================

#[test]
fn bulk_replace_swaps_the_full_override_set() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    store
        .upsert_override(&draft(
            "MAG17",
            1,
            "0.92",
            EffectiveInterval::open_ended(date!(2016 - 01 - 01)),
        ))
        .expect("prior upsert");

    let deal = DealId::new("MAG17");
    let replacement = vec![
        draft("MAG17", 1, "0.90", EffectiveInterval::open_ended(date!(2016 - 03 - 23))),
        draft("MAG17", 40, "0.65", EffectiveInterval::open_ended(date!(2016 - 03 - 23))),
    ];
    let assigned = store.bulk_replace_deal_overrides(&deal, &replacement).expect("replace");
    assert_eq!(assigned.len(), 2);

    let rows = store.list_deal_overrides(&deal).expect("list");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].value, decimal("0.90"));
    assert_eq!(rows[1].value, decimal("0.65"));
}

#[test]
fn bulk_replace_failure_leaves_prior_set_intact() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    store
        .upsert_override(&draft(
            "MAG17",
            1,
            "0.92",
            EffectiveInterval::open_ended(date!(2016 - 01 - 01)),
        ))
        .expect("prior upsert");

    let deal = DealId::new("MAG17");
    let colliding = vec![
        draft("MAG17", 40, "0.65", EffectiveInterval::open_ended(date!(2016 - 03 - 23))),
        draft("MAG17", 40, "0.70", EffectiveInterval::open_ended(date!(2016 - 09 - 01))),
    ];
    let result = store.bulk_replace_deal_overrides(&deal, &colliding);
    assert!(matches!(result, Err(OverrideError::Overlap { .. })));

    let rows = store.list_deal_overrides(&deal).expect("list");
    assert_eq!(rows.len(), 1, "failed replacement must not touch prior rows");
    assert_eq!(rows[0].value, decimal("0.92"));
}

#[test]
fn bulk_replace_rejects_draft_for_another_deal() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    let deal = DealId::new("MAG17");
    let foreign =
        vec![draft("MAG9", 1, "0.90", EffectiveInterval::open_ended(date!(2016 - 03 - 23)))];
    let result = store.bulk_replace_deal_overrides(&deal, &foreign);
    assert!(matches!(result, Err(OverrideError::Invalid { .. })));
}

// ============================================================================
// SECTION: Diagnostics
// ============================================================================

#[test]
fn readiness_and_perf_counters_track_operations() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store(&dir);
    store.readiness().expect("readiness");
    store
        .upsert_override(&draft(
            "MAG17",
            1,
            "0.90",
            EffectiveInterval::open_ended(date!(2016 - 03 - 23)),
        ))
        .expect("upsert");
    let _ = store
        .get_active_override(&DealId::new("MAG17"), TestId::from_raw(1).unwrap(), date!(2017 - 01 - 01))
        .expect("read");

    let snapshot = store.perf_stats_snapshot();
    assert!(snapshot.op_counts.write >= 2, "seed and upsert are write ops");
    assert!(snapshot.op_counts.override_read >= 1);

    store.reset_perf_stats();
    let reset = store.perf_stats_snapshot();
    assert_eq!(reset.op_counts.write, 0);
    assert_eq!(reset.op_counts.override_read, 0);
}
