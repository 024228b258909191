// crates/threshold-ledger-core/src/core/catalog.rs
// ============================================================================
// Module: Rule Catalog Types
// Description: Test definitions, categories, units, and deal records.
// Purpose: Model the versioned rule catalog that supplies default thresholds.
// Dependencies: serde, bigdecimal, time
// ============================================================================

//! ## Overview
//! The rule catalog is a fixed, versioned set of named concentration-test
//! definitions, each carrying a default threshold. Catalog entries are
//! created during seeding and treated as immutable once overrides reference
//! them. Deals apply a vintage-dependent subset of the catalog.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;
use time::Date;

use crate::core::identifiers::DealId;
use crate::core::identifiers::TestId;
use crate::core::identifiers::TestNumber;

// ============================================================================
// SECTION: Catalog Enums
// ============================================================================

/// Reporting category of a concentration test.
///
/// # Invariants
/// - Variants are stable; `as_str`/`parse` are the only string boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    /// Credit-quality composition rules (ratings, defaulted share).
    AssetQuality,
    /// Exposure caps per obligor, industry, or country.
    Concentration,
    /// Collateral composition rules (senior secured share, cov-lite share).
    Collateral,
    /// Weighted-average portfolio statistics (WAC, WAL, WARF).
    WeightedAverage,
}

impl TestCategory {
    /// Returns the canonical label for the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AssetQuality => "asset_quality",
            Self::Concentration => "concentration",
            Self::Collateral => "collateral",
            Self::WeightedAverage => "weighted_average",
        }
    }

    /// Parses a canonical category label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "asset_quality" => Some(Self::AssetQuality),
            "concentration" => Some(Self::Concentration),
            "collateral" => Some(Self::Collateral),
            "weighted_average" => Some(Self::WeightedAverage),
            _ => None,
        }
    }
}

/// Unit semantics of a threshold value.
///
/// # Invariants
/// - Variants are stable; `as_str`/`parse` are the only string boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdUnit {
    /// Decimal fraction of aggregate par (0-1 typically).
    Ratio,
    /// Percentage points (0-100).
    Percent,
    /// Absolute count of positions or obligors.
    Count,
    /// Year-denominated statistic (e.g. weighted average life).
    Years,
}

impl ThresholdUnit {
    /// Returns the canonical label for the unit.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ratio => "ratio",
            Self::Percent => "percent",
            Self::Count => "count",
            Self::Years => "years",
        }
    }

    /// Parses a canonical unit label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "ratio" => Some(Self::Ratio),
            "percent" => Some(Self::Percent),
            "count" => Some(Self::Count),
            "years" => Some(Self::Years),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Catalog Records
// ============================================================================

/// One catalog entry: a named test with its default threshold.
///
/// # Invariants
/// - `test_id` is unique and immutable once referenced by any override.
/// - `test_number` is unique within the catalog.
/// - `default_threshold` is exact decimal; no float round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDefinition {
    /// Stable catalog identity.
    pub test_id: TestId,
    /// Display/reporting order.
    pub test_number: TestNumber,
    /// Human-readable test name.
    pub name: String,
    /// Reporting category.
    pub category: TestCategory,
    /// Default threshold applied when no override is active.
    pub default_threshold: BigDecimal,
    /// Unit semantics of the threshold value.
    pub unit: ThresholdUnit,
}

/// One CLO instrument.
///
/// # Invariants
/// - `deal_id` is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    /// Business key (e.g. `"MAG17"`).
    pub deal_id: DealId,
    /// Full instrument name.
    pub name: String,
    /// Vintage/inception date; determines the applicable test subset.
    pub vintage: Date,
    /// Target aggregate notional.
    pub target_notional: BigDecimal,
}
