// crates/threshold-ledger-core/src/lib.rs
// ============================================================================
// Module: Threshold Ledger Core
// Description: Domain model and resolution logic for deal threshold overrides.
// Purpose: Define catalog, override, and resolver types with stable wire forms.
// Dependencies: serde, thiserror, bigdecimal, time
// ============================================================================

//! ## Overview
//! Threshold Ledger resolves the concentration-test threshold in effect for a
//! CLO deal at an as-of date. A versioned rule catalog supplies per-test
//! defaults; per-deal, time-scoped overrides win over the default whenever
//! one is active. This crate holds the domain model, the backend-agnostic
//! store interfaces, and the pure read-time resolver. Durable backends live
//! in companion crates.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::core::catalog::Deal;
pub use crate::core::catalog::TestCategory;
pub use crate::core::catalog::TestDefinition;
pub use crate::core::catalog::ThresholdUnit;
pub use crate::core::identifiers::AnalystId;
pub use crate::core::identifiers::DealId;
pub use crate::core::identifiers::OverrideId;
pub use crate::core::identifiers::TestId;
pub use crate::core::identifiers::TestNumber;
pub use crate::core::interval::EffectiveInterval;
pub use crate::core::interval::IntervalError;
pub use crate::core::overrides::OverrideDraft;
pub use crate::core::overrides::ThresholdOverride;
pub use crate::interfaces::CatalogError;
pub use crate::interfaces::CatalogStore;
pub use crate::interfaces::OverrideError;
pub use crate::interfaces::OverrideStore;
pub use crate::runtime::resolver::ResolveError;
pub use crate::runtime::resolver::ResolvedThreshold;
pub use crate::runtime::resolver::Resolver;
pub use crate::runtime::resolver::ThresholdProvenance;
