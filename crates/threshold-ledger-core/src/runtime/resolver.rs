// crates/threshold-ledger-core/src/runtime/resolver.rs
// ============================================================================
// Module: Threshold Resolver
// Description: Merge logic computing the threshold in effect for a deal/test.
// Purpose: Apply active overrides over catalog defaults with provenance tags.
// Dependencies: crate::core, crate::interfaces, bigdecimal, thiserror
// ============================================================================

//! ## Overview
//! The resolver computes the effective threshold for `(deal, test, as-of
//! date)`: an override whose interval contains the as-of date wins over the
//! catalog default. Resolution is pure read-time logic; given fixed store
//! state, identical arguments always yield identical results. Batch
//! resolution iterates deterministically by ascending test number.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;

use crate::core::catalog::TestDefinition;
use crate::core::catalog::ThresholdUnit;
use crate::core::identifiers::DealId;
use crate::core::identifiers::OverrideId;
use crate::core::identifiers::TestId;
use crate::core::identifiers::TestNumber;
use crate::interfaces::CatalogError;
use crate::interfaces::CatalogStore;
use crate::interfaces::OverrideError;
use crate::interfaces::OverrideStore;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Resolution errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Resolution requested for a test identifier with no catalog entry.
    #[error("unknown test {test_id}: no catalog entry")]
    UnknownTest {
        /// Test identifier with no catalog entry.
        test_id: TestId,
    },
    /// Catalog access failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Override access failed.
    #[error(transparent)]
    Override(#[from] OverrideError),
}

// ============================================================================
// SECTION: Resolution Results
// ============================================================================

/// Source of a resolved threshold value.
///
/// # Invariants
/// - Variants are stable for reporting and audit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "override_id", rename_all = "snake_case")]
pub enum ThresholdProvenance {
    /// Value came from the catalog default.
    Default,
    /// Value came from an active deal override.
    Override(OverrideId),
}

impl ThresholdProvenance {
    /// Returns the canonical label for the provenance.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Override(_) => "override",
        }
    }
}

/// Threshold value in effect for one test, with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedThreshold {
    /// Stable catalog identity of the test.
    pub test_id: TestId,
    /// Display/reporting order of the test.
    pub test_number: TestNumber,
    /// Threshold value in effect at the as-of date.
    pub value: BigDecimal,
    /// Unit semantics of the value.
    pub unit: ThresholdUnit,
    /// Where the value came from.
    pub provenance: ThresholdProvenance,
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Read-time threshold resolver over a catalog and an override store.
///
/// # Invariants
/// - Holds no mutable state; resolution is pure given fixed store state.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a, C: CatalogStore, O: OverrideStore> {
    /// Rule catalog supplying defaults and test identity.
    catalog: &'a C,
    /// Override store supplying deal-specific replacements.
    overrides: &'a O,
}

impl<'a, C: CatalogStore, O: OverrideStore> Resolver<'a, C, O> {
    /// Creates a resolver over explicit store handles.
    #[must_use]
    pub const fn new(catalog: &'a C, overrides: &'a O) -> Self {
        Self {
            catalog,
            overrides,
        }
    }

    /// Computes the threshold in effect for `(deal, test, as-of date)`.
    ///
    /// An override whose interval contains `as_of` wins; otherwise the
    /// catalog default applies.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownTest`] when the catalog has no entry
    /// for `test_id`, or propagates store failures unchanged.
    pub fn resolve(
        &self,
        deal_id: &DealId,
        test_id: TestId,
        as_of: Date,
    ) -> Result<ResolvedThreshold, ResolveError> {
        let definition = self
            .catalog
            .get_test(test_id)?
            .ok_or(ResolveError::UnknownTest {
                test_id,
            })?;
        self.resolve_against(deal_id, &definition, as_of)
    }

    /// Materializes the full threshold set applicable to a deal.
    ///
    /// Deterministic: the result iterates by ascending test number. Strict:
    /// every requested number must exist in the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] (wrapped) when any requested test
    /// number has no catalog entry, or propagates store failures unchanged.
    pub fn resolve_all(
        &self,
        deal_id: &DealId,
        test_numbers: &BTreeSet<TestNumber>,
        as_of: Date,
    ) -> Result<BTreeMap<TestNumber, ResolvedThreshold>, ResolveError> {
        let definitions = self.catalog.get_applicable_tests(test_numbers)?;
        let mut resolved = BTreeMap::new();
        for definition in definitions.values() {
            let threshold = self.resolve_against(deal_id, definition, as_of)?;
            resolved.insert(definition.test_number, threshold);
        }
        Ok(resolved)
    }

    /// Applies the override-over-default merge for one catalog entry.
    fn resolve_against(
        &self,
        deal_id: &DealId,
        definition: &TestDefinition,
        as_of: Date,
    ) -> Result<ResolvedThreshold, ResolveError> {
        let active = self.overrides.get_active_override(deal_id, definition.test_id, as_of)?;
        let (value, provenance) = match active {
            Some(row) => (row.value, ThresholdProvenance::Override(row.override_id)),
            None => (definition.default_threshold.clone(), ThresholdProvenance::Default),
        };
        Ok(ResolvedThreshold {
            test_id: definition.test_id,
            test_number: definition.test_number,
            value,
            unit: definition.unit,
            provenance,
        })
    }
}
