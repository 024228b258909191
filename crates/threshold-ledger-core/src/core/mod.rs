// crates/threshold-ledger-core/src/core/mod.rs
// ============================================================================
// Module: Core Domain Types
// Description: Identifier, catalog, interval, and override type definitions.
// Purpose: Group the value types shared by stores and the resolver.
// Dependencies: serde, bigdecimal, time
// ============================================================================

//! Core value types for the threshold ledger domain.

pub mod catalog;
pub mod identifiers;
pub mod interval;
pub mod overrides;
