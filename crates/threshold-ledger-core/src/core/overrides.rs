// crates/threshold-ledger-core/src/core/overrides.rs
// ============================================================================
// Module: Threshold Overrides
// Description: Persisted override rows and write-side override drafts.
// Purpose: Model deal-specific, time-scoped threshold replacements.
// Dependencies: serde, bigdecimal
// ============================================================================

//! ## Overview
//! A threshold override replaces a catalog default for one deal and one test
//! over an inclusive date interval. Rows are append-only for auditability:
//! corrections and supersessions are new rows, never in-place mutation. The
//! non-overlap invariant (at most one active override per key per date) is
//! enforced by stores at write time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::AnalystId;
use crate::core::identifiers::DealId;
use crate::core::identifiers::OverrideId;
use crate::core::identifiers::TestId;
use crate::core::interval::EffectiveInterval;

// ============================================================================
// SECTION: Override Records
// ============================================================================

/// Persisted threshold override row.
///
/// # Invariants
/// - For a `(deal_id, test_id)` key, stored intervals never overlap.
/// - Rows are never mutated in place; supersession inserts a new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdOverride {
    /// Store-assigned row identity.
    pub override_id: OverrideId,
    /// Deal the override belongs to.
    pub deal_id: DealId,
    /// Catalog test the override replaces the default for.
    pub test_id: TestId,
    /// Replacement threshold value.
    pub value: BigDecimal,
    /// Inclusive validity interval.
    pub interval: EffectiveInterval,
    /// Free-text provenance note (amendment reference, indenture section).
    pub note: Option<String>,
    /// Creator identity.
    pub created_by: AnalystId,
    /// Creation timestamp in unix epoch milliseconds.
    pub created_at: i64,
}

/// Write-side override specification, prior to store assignment of identity.
///
/// # Invariants
/// - `interval` is already validated (`effective <= expiry` when present).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideDraft {
    /// Deal the override belongs to.
    pub deal_id: DealId,
    /// Catalog test the override replaces the default for.
    pub test_id: TestId,
    /// Replacement threshold value.
    pub value: BigDecimal,
    /// Inclusive validity interval.
    pub interval: EffectiveInterval,
    /// Free-text provenance note.
    pub note: Option<String>,
    /// Creator identity.
    pub created_by: AnalystId,
}
