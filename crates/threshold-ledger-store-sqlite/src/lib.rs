// crates/threshold-ledger-store-sqlite/src/lib.rs
// ============================================================================
// Module: Threshold Ledger SQLite Store
// Description: Durable catalog and override store backed by SQLite.
// Purpose: Provide the persistent backend for threshold resolution.
// Dependencies: threshold-ledger-core, rusqlite
// ============================================================================

//! ## Overview
//! SQLite-backed implementation of the [`threshold_ledger_core::CatalogStore`]
//! and [`threshold_ledger_core::OverrideStore`] interfaces. Writes run in
//! immediate transactions on a single mutex-guarded connection so the
//! non-overlap check is race-free; reads go through a small read-only pool.

mod store;

pub use store::SqliteDbErrorCounts;
pub use store::SqliteJournalMode;
pub use store::SqliteLedgerConfig;
pub use store::SqliteLedgerError;
pub use store::SqliteLedgerStore;
pub use store::SqliteOpCounts;
pub use store::SqliteStatsSnapshot;
pub use store::SqliteSyncMode;
