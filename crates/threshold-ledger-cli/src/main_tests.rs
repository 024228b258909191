// crates/threshold-ledger-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and bounded file reads.
// Purpose: Ensure CLI input handling is strict and fails closed.
// Dependencies: threshold-ledger-cli main helpers
// ============================================================================

//! ## Overview
//! Validates the CLI's argument parsing helpers and the size cap on JSON
//! input files.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;

use tempfile::NamedTempFile;
use threshold_ledger_core::TestDefinition;
use threshold_ledger_core::TestNumber;
use time::macros::date;

use super::parse_cli_date;
use super::parse_decimal_arg;
use super::parse_numbers;
use super::read_json_file;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn parse_numbers_accepts_comma_separated_list() {
    let numbers = parse_numbers("1, 34,40").expect("valid list");
    let expected: Vec<TestNumber> =
        vec![TestNumber::new(1), TestNumber::new(34), TestNumber::new(40)];
    assert_eq!(numbers.into_iter().collect::<Vec<_>>(), expected);
}

#[test]
fn parse_numbers_rejects_empty_input() {
    assert!(parse_numbers("").is_err());
    assert!(parse_numbers(" , ,").is_err());
}

#[test]
fn parse_numbers_rejects_non_numeric_entries() {
    assert!(parse_numbers("1,abc").is_err());
}

#[test]
fn parse_cli_date_accepts_iso_dates() {
    let parsed = parse_cli_date("2016-03-23").expect("valid date");
    assert_eq!(parsed, date!(2016 - 03 - 23));
}

#[test]
fn parse_cli_date_rejects_other_formats() {
    assert!(parse_cli_date("03/23/2016").is_err());
    assert!(parse_cli_date("2016-3-23").is_err());
}

#[test]
fn parse_decimal_arg_round_trips_exact_values() {
    let parsed = parse_decimal_arg("0.065").expect("valid decimal");
    assert_eq!(parsed.to_string(), "0.065");
    assert!(parse_decimal_arg("not-a-number").is_err());
}

#[test]
fn read_json_file_rejects_oversized_input() {
    let mut file = NamedTempFile::new().unwrap();
    let payload = vec![b'a'; 1_048_577];
    file.write_all(&payload).unwrap();
    let result: Result<Vec<TestDefinition>, _> = read_json_file(file.path());
    assert!(result.is_err(), "oversized input must be rejected");
}

#[test]
fn read_json_file_parses_test_definitions() {
    let mut file = NamedTempFile::new().unwrap();
    let payload = r#"[
        {
            "test_id": 34,
            "test_number": 34,
            "name": "Minimum Weighted Average Coupon",
            "category": "weighted_average",
            "default_threshold": "0.07",
            "unit": "ratio"
        }
    ]"#;
    file.write_all(payload.as_bytes()).unwrap();
    let definitions: Vec<TestDefinition> = read_json_file(file.path()).expect("valid input");
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].test_number, TestNumber::new(34));
}
