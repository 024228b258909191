// crates/threshold-ledger-core/src/runtime/mod.rs
// ============================================================================
// Module: Resolution Runtime
// Description: Read-time threshold resolution over catalog and override stores.
// Purpose: Group the pure resolution logic consumed by callers.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! Read-time resolution logic.

pub mod resolver;
