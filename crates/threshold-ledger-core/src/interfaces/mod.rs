// crates/threshold-ledger-core/src/interfaces/mod.rs
// ============================================================================
// Module: Threshold Ledger Interfaces
// Description: Backend-agnostic interfaces for catalog and override storage.
// Purpose: Define the contract surfaces used by the resolver and tooling.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the resolver reads the rule catalog and the override
//! store without embedding backend-specific details. Implementations must be
//! deterministic and fail closed: a requested test number missing from the
//! catalog is an error, and overlapping override data is surfaced rather than
//! silently tie-broken.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;
use time::Date;

use crate::core::catalog::TestDefinition;
use crate::core::identifiers::DealId;
use crate::core::identifiers::OverrideId;
use crate::core::identifiers::TestId;
use crate::core::identifiers::TestNumber;
use crate::core::interval::EffectiveInterval;
use crate::core::overrides::OverrideDraft;
use crate::core::overrides::ThresholdOverride;

// ============================================================================
// SECTION: Catalog Store
// ============================================================================

/// Formats a test-number list for error messages.
fn join_numbers(numbers: &[TestNumber]) -> String {
    let rendered: Vec<String> = numbers.iter().map(ToString::to_string).collect();
    rendered.join(", ")
}

/// Rule catalog errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Requested test numbers have no catalog entry.
    #[error("catalog entries missing for test numbers [{}]", join_numbers(.test_numbers))]
    NotFound {
        /// Test numbers with no catalog entry, ascending.
        test_numbers: Vec<TestNumber>,
    },
    /// Underlying storage failure, propagated unchanged.
    #[error("catalog store error: {0}")]
    Store(String),
}

/// Read access to the versioned rule catalog.
pub trait CatalogStore {
    /// Returns the catalog subset matching the given test numbers.
    ///
    /// Strict: every requested number must have a catalog entry; the catalog
    /// is the source of truth and nothing is silently skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] listing every requested number with
    /// no entry, or [`CatalogError::Store`] on storage failure.
    fn get_applicable_tests(
        &self,
        test_numbers: &BTreeSet<TestNumber>,
    ) -> Result<BTreeMap<TestId, TestDefinition>, CatalogError>;

    /// Returns the catalog entry for a test identifier, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Store`] on storage failure.
    fn get_test(&self, test_id: TestId) -> Result<Option<TestDefinition>, CatalogError>;
}

// ============================================================================
// SECTION: Override Store
// ============================================================================

/// Override store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Every variant carries the offending key and date range for diagnosis.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OverrideError {
    /// A write collides with an existing interval for the same key.
    #[error(
        "override interval {attempted} for deal {deal_id} test {test_id} overlaps existing \
         {existing}"
    )]
    Overlap {
        /// Deal identifier of the rejected write.
        deal_id: DealId,
        /// Test identifier of the rejected write.
        test_id: TestId,
        /// Interval the caller attempted to insert.
        attempted: EffectiveInterval,
        /// Existing interval it collides with.
        existing: EffectiveInterval,
    },
    /// Stored data already violates the non-overlap invariant.
    #[error(
        "ambiguous overrides for deal {deal_id} test {test_id} at {as_of}: {count} intervals \
         contain the as-of date"
    )]
    Ambiguous {
        /// Deal identifier of the ambiguous key.
        deal_id: DealId,
        /// Test identifier of the ambiguous key.
        test_id: TestId,
        /// As-of date contained by more than one interval.
        as_of: Date,
        /// Number of intervals containing the as-of date.
        count: usize,
    },
    /// Invalid override data (unknown test, malformed value, bad interval).
    #[error("invalid override for deal {deal_id} test {test_id}: {message}")]
    Invalid {
        /// Deal identifier of the rejected write.
        deal_id: DealId,
        /// Test identifier of the rejected write.
        test_id: TestId,
        /// Human-readable rejection reason.
        message: String,
    },
    /// Underlying storage failure, propagated unchanged.
    #[error("override store error: {0}")]
    Store(String),
}

/// Read/write access to deal threshold overrides.
pub trait OverrideStore {
    /// Returns the override whose interval contains `as_of`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Ambiguous`] when stored data has more than
    /// one interval containing `as_of` (correctness over availability), or
    /// [`OverrideError::Store`] on storage failure.
    fn get_active_override(
        &self,
        deal_id: &DealId,
        test_id: TestId,
        as_of: Date,
    ) -> Result<Option<ThresholdOverride>, OverrideError>;

    /// Inserts a new override after checking the non-overlap invariant.
    ///
    /// The overlap check and the insert are one atomic unit; concurrent
    /// writers for the same key serialize inside the store.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Overlap`] when the new interval intersects an
    /// existing one for the same `(deal_id, test_id)`,
    /// [`OverrideError::Invalid`] for unknown tests or malformed data, or
    /// [`OverrideError::Store`] on storage failure.
    fn upsert_override(&self, draft: &OverrideDraft) -> Result<OverrideId, OverrideError>;

    /// Atomically replaces every override for a deal with the given set.
    ///
    /// All-or-nothing: if any insert would violate the non-overlap invariant
    /// the prior override set is left intact.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Overlap`] when two drafts in the new set
    /// collide, [`OverrideError::Invalid`] for malformed drafts, or
    /// [`OverrideError::Store`] on storage failure.
    fn bulk_replace_deal_overrides(
        &self,
        deal_id: &DealId,
        overrides: &[OverrideDraft],
    ) -> Result<Vec<OverrideId>, OverrideError>;

    /// Lists every override for a deal, ordered by test number then
    /// effective date.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError::Store`] on storage failure.
    fn list_deal_overrides(
        &self,
        deal_id: &DealId,
    ) -> Result<Vec<ThresholdOverride>, OverrideError>;
}
