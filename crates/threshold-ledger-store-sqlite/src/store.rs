// crates/threshold-ledger-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Ledger Store
// Description: Durable CatalogStore and OverrideStore backed by SQLite WAL.
// Purpose: Persist the rule catalog and deal overrides with invariant checks.
// Dependencies: threshold-ledger-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements the durable catalog and override store using
//! `SQLite`. Override rows are append-only; the non-overlap invariant for a
//! `(deal_id, test_id)` key is enforced inside an immediate write transaction
//! so concurrent writers serialize and at most one colliding insert wins.
//! Reads go through a small round-robin pool of connections and fail closed:
//! stored data that already violates the invariant surfaces as an error
//! instead of being tie-broken.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use bigdecimal::BigDecimal;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use threshold_ledger_core::AnalystId;
use threshold_ledger_core::CatalogError;
use threshold_ledger_core::CatalogStore;
use threshold_ledger_core::DealId;
use threshold_ledger_core::EffectiveInterval;
use threshold_ledger_core::OverrideDraft;
use threshold_ledger_core::OverrideError;
use threshold_ledger_core::OverrideId;
use threshold_ledger_core::OverrideStore;
use threshold_ledger_core::TestCategory;
use threshold_ledger_core::TestDefinition;
use threshold_ledger_core::TestId;
use threshold_ledger_core::TestNumber;
use threshold_ledger_core::ThresholdOverride;
use threshold_ledger_core::ThresholdUnit;
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Millisecond bucket boundaries used for lightweight store perf snapshots.
const PERF_BUCKETS_MS: [u64; 10] = [1, 2, 5, 10, 20, 50, 100, 250, 500, 1_000];
/// Histogram slot count: one slot per bucket plus an overflow slot.
const PERF_HISTOGRAM_SLOTS: usize = 11;
/// ISO-8601 calendar date format used for all persisted dates.
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Column list shared by every override row query.
const OVERRIDE_COLUMNS: &str = "override_id, deal_id, test_id, threshold_value, effective_date, \
                                expiry_date, note, created_by, created_at";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` ledger store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `read_pool_size` must be greater than zero.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteLedgerConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read-only connections used for read path isolation.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    4
}

/// Validates runtime limits in the store configuration.
fn validate_runtime_limits(config: &SqliteLedgerConfig) -> Result<(), SqliteLedgerError> {
    if config.read_pool_size == 0 {
        return Err(SqliteLedgerError::Invalid(
            "read_pool_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` ledger store errors.
///
/// # Invariants
/// - Error messages avoid embedding full row payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteLedgerError {
    /// Store I/O error.
    #[error("sqlite ledger io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite ledger db error: {0}")]
    Db(String),
    /// Stored rows that cannot be decoded back into domain values.
    #[error("sqlite ledger corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite ledger version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite ledger invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteLedgerError> for CatalogError {
    fn from(error: SqliteLedgerError) -> Self {
        Self::Store(error.to_string())
    }
}

impl From<SqliteLedgerError> for OverrideError {
    fn from(error: SqliteLedgerError) -> Self {
        Self::Store(error.to_string())
    }
}

// ============================================================================
// SECTION: Perf Stats
// ============================================================================

/// Operation classes tracked by the lightweight perf counters.
#[derive(Debug, Clone, Copy)]
enum SqlitePerfOp {
    /// Catalog read path (definitions).
    CatalogRead,
    /// Override read path (active lookups, listings).
    OverrideRead,
    /// Write path (seeding, upserts, bulk replaces).
    Write,
}

/// Per-class operation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqliteOpCounts {
    /// Catalog read operations.
    pub catalog_read: u64,
    /// Override read operations.
    pub override_read: u64,
    /// Write operations.
    pub write: u64,
}

/// Coarse DB error counters by contention class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqliteDbErrorCounts {
    /// Errors whose text indicates busy timeout contention.
    pub busy: u64,
    /// Errors whose text indicates lock contention.
    pub locked: u64,
    /// Any error not matching busy/locked classifiers.
    pub other: u64,
}

/// Mutable perf counter state guarded by the store mutex.
#[derive(Debug, Default)]
struct SqlitePerfStats {
    /// Per-class operation counters.
    op_counts: SqliteOpCounts,
    /// Catalog read latency histogram.
    catalog_read_latency_histogram: [u64; PERF_HISTOGRAM_SLOTS],
    /// Override read latency histogram.
    override_read_latency_histogram: [u64; PERF_HISTOGRAM_SLOTS],
    /// Write latency histogram.
    write_latency_histogram: [u64; PERF_HISTOGRAM_SLOTS],
    /// Cumulative catalog read duration (ms).
    catalog_read_total_duration_ms: u64,
    /// Cumulative override read duration (ms).
    override_read_total_duration_ms: u64,
    /// Cumulative write duration (ms).
    write_total_duration_ms: u64,
    /// Coarse DB error counters.
    db_errors: SqliteDbErrorCounts,
}

/// Point-in-time snapshot of store perf counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqliteStatsSnapshot {
    /// Per-class operation counters.
    pub op_counts: SqliteOpCounts,
    /// Millisecond bucket boundaries for the latency histograms.
    pub latency_buckets_ms: Vec<u64>,
    /// Catalog read latency histogram.
    pub catalog_read_latency_histogram: Vec<u64>,
    /// Override read latency histogram.
    pub override_read_latency_histogram: Vec<u64>,
    /// Write latency histogram.
    pub write_latency_histogram: Vec<u64>,
    /// Cumulative catalog read duration (ms).
    pub catalog_read_total_duration_ms: u64,
    /// Cumulative override read duration (ms).
    pub override_read_total_duration_ms: u64,
    /// Cumulative write duration (ms).
    pub write_total_duration_ms: u64,
    /// Coarse DB error counters.
    pub db_errors: SqliteDbErrorCounts,
}

/// Classification used when attributing `SQLite` DB error strings.
#[derive(Debug, Clone, Copy)]
enum SqliteDbErrorKind {
    /// Error text indicates busy timeout contention.
    Busy,
    /// Error text indicates lock contention.
    Locked,
    /// Any error not matching busy/locked classifiers.
    Other,
}

/// Returns latency histogram bucket index for a millisecond duration.
const fn histogram_bucket_index(duration_ms: u64) -> usize {
    let mut index = 0usize;
    while index < PERF_BUCKETS_MS.len() {
        if duration_ms <= PERF_BUCKETS_MS[index] {
            return index;
        }
        index += 1;
    }
    PERF_BUCKETS_MS.len()
}

/// Classifies database error text into coarse contention categories.
fn classify_db_error_message(message: &str) -> SqliteDbErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("busy") {
        SqliteDbErrorKind::Busy
    } else if lower.contains("locked") {
        SqliteDbErrorKind::Locked
    } else {
        SqliteDbErrorKind::Other
    }
}

/// Returns DB error message when a catalog error variant maps to storage.
const fn db_error_message_catalog(error: &CatalogError) -> Option<&str> {
    match error {
        CatalogError::Store(message) => Some(message.as_str()),
        CatalogError::NotFound {
            ..
        } => None,
    }
}

/// Returns DB error message when an override error variant maps to storage.
const fn db_error_message_override(error: &OverrideError) -> Option<&str> {
    match error {
        OverrideError::Store(message) => Some(message.as_str()),
        _ => None,
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed catalog and override store with WAL support.
///
/// # Invariants
/// - Writes run in immediate transactions on a single mutex-guarded
///   connection; the overlap check and insert are one atomic unit.
/// - Catalog entries referenced by overrides are immutable.
#[derive(Clone)]
pub struct SqliteLedgerStore {
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read-only connection pool used for read path isolation under WAL.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
    /// Lightweight operation stats used for local performance diagnostics.
    perf_stats: Arc<Mutex<SqlitePerfStats>>,
}

impl SqliteLedgerStore {
    /// Opens an `SQLite`-backed ledger store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteLedgerError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteLedgerConfig) -> Result<Self, SqliteLedgerError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        validate_runtime_limits(config)?;
        let mut write_connection = open_connection(config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            let mut read_connection = open_connection(config)?;
            initialize_schema(&mut read_connection)?;
            read_connections.push(Mutex::new(read_connection));
        }
        Ok(Self {
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
            perf_stats: Arc::new(Mutex::new(SqlitePerfStats::default())),
        })
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteLedgerError`] if a mutex is poisoned or the query
    /// fails.
    pub fn readiness(&self) -> Result<(), SqliteLedgerError> {
        {
            let guard = self
                .read_connection()
                .lock()
                .map_err(|_| SqliteLedgerError::Io("sqlite read mutex poisoned".to_string()))?;
            guard
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        }
        let guard = self
            .write_connection
            .lock()
            .map_err(|_| SqliteLedgerError::Io("sqlite write mutex poisoned".to_string()))?;
        guard
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        Ok(())
    }

    /// Returns a snapshot of lightweight operation and contention stats.
    #[must_use]
    pub fn perf_stats_snapshot(&self) -> SqliteStatsSnapshot {
        let guard = self.perf_stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        SqliteStatsSnapshot {
            op_counts: guard.op_counts.clone(),
            latency_buckets_ms: PERF_BUCKETS_MS.to_vec(),
            catalog_read_latency_histogram: guard.catalog_read_latency_histogram.to_vec(),
            override_read_latency_histogram: guard.override_read_latency_histogram.to_vec(),
            write_latency_histogram: guard.write_latency_histogram.to_vec(),
            catalog_read_total_duration_ms: guard.catalog_read_total_duration_ms,
            override_read_total_duration_ms: guard.override_read_total_duration_ms,
            write_total_duration_ms: guard.write_total_duration_ms,
            db_errors: guard.db_errors.clone(),
        }
    }

    /// Resets lightweight operation and contention stats to zero.
    pub fn reset_perf_stats(&self) {
        if let Ok(mut guard) = self.perf_stats.lock() {
            *guard = SqlitePerfStats::default();
        }
    }

    /// Seeds the rule catalog, returning the number of rows written.
    ///
    /// Idempotent: entries identical to stored rows are skipped. Entries that
    /// differ from a stored row are updated only while no override references
    /// the test; referenced entries are immutable.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteLedgerError::Invalid`] when a changed entry is already
    /// referenced by overrides or when input numbers collide, or
    /// [`SqliteLedgerError::Db`] on storage failure.
    pub fn seed_catalog(&self, definitions: &[TestDefinition]) -> Result<u64, SqliteLedgerError> {
        let started = Instant::now();
        let result = self.seed_catalog_inner(definitions);
        let db_error = match result.as_ref() {
            Err(SqliteLedgerError::Db(message)) => Some(message.as_str()),
            _ => None,
        };
        self.record_store_op(SqlitePerfOp::Write, started.elapsed(), db_error);
        result
    }

    /// Transactional body of [`Self::seed_catalog`].
    fn seed_catalog_inner(&self, definitions: &[TestDefinition]) -> Result<u64, SqliteLedgerError> {
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| SqliteLedgerError::Io("sqlite write mutex poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        let mut written = 0u64;
        for definition in definitions {
            let test_id = encode_test_id(definition.test_id)?;
            let existing = tx
                .query_row(
                    "SELECT test_number, name, category, unit, default_threshold FROM \
                     test_definitions WHERE test_id = ?1",
                    params![test_id],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()
                .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
            match existing {
                None => {
                    tx.execute(
                        "INSERT INTO test_definitions (test_id, test_number, name, category, \
                         unit, default_threshold) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            test_id,
                            i64::from(definition.test_number.get()),
                            definition.name,
                            definition.category.as_str(),
                            definition.unit.as_str(),
                            definition.default_threshold.to_string(),
                        ],
                    )
                    .map_err(map_catalog_write_error)?;
                    written = written.saturating_add(1);
                }
                Some(row) => {
                    let stored = definition_from_row(test_id, row.0, row.1, row.2, row.3, row.4)?;
                    if stored == *definition {
                        continue;
                    }
                    let reference_count: i64 = tx
                        .query_row(
                            "SELECT COUNT(1) FROM deal_threshold_overrides WHERE test_id = ?1",
                            params![test_id],
                            |count_row| count_row.get(0),
                        )
                        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
                    if reference_count > 0 {
                        return Err(SqliteLedgerError::Invalid(format!(
                            "catalog entry for test {} is referenced by {reference_count} \
                             override(s) and cannot change",
                            definition.test_id
                        )));
                    }
                    tx.execute(
                        "UPDATE test_definitions SET test_number = ?2, name = ?3, category = ?4, \
                         unit = ?5, default_threshold = ?6 WHERE test_id = ?1",
                        params![
                            test_id,
                            i64::from(definition.test_number.get()),
                            definition.name,
                            definition.category.as_str(),
                            definition.unit.as_str(),
                            definition.default_threshold.to_string(),
                        ],
                    )
                    .map_err(map_catalog_write_error)?;
                    written = written.saturating_add(1);
                }
            }
        }
        tx.commit().map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        Ok(written)
    }

    /// Lists the full rule catalog ordered by test number.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteLedgerError`] on storage failure or undecodable rows.
    pub fn list_catalog(&self) -> Result<Vec<TestDefinition>, SqliteLedgerError> {
        let started = Instant::now();
        let result = self.load_definitions();
        let db_error = match result.as_ref() {
            Err(SqliteLedgerError::Db(message)) => Some(message.as_str()),
            _ => None,
        };
        self.record_store_op(SqlitePerfOp::CatalogRead, started.elapsed(), db_error);
        result
    }

    /// Records operation timing plus optional DB error classification.
    fn record_store_op(
        &self,
        op: SqlitePerfOp,
        elapsed: std::time::Duration,
        db_error: Option<&str>,
    ) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let bucket_index = histogram_bucket_index(elapsed_ms);
        let Ok(mut stats) = self.perf_stats.lock() else {
            return;
        };
        match op {
            SqlitePerfOp::CatalogRead => {
                stats.op_counts.catalog_read = stats.op_counts.catalog_read.saturating_add(1);
                stats.catalog_read_total_duration_ms =
                    stats.catalog_read_total_duration_ms.saturating_add(elapsed_ms);
                if let Some(slot) = stats.catalog_read_latency_histogram.get_mut(bucket_index) {
                    *slot = slot.saturating_add(1);
                }
            }
            SqlitePerfOp::OverrideRead => {
                stats.op_counts.override_read = stats.op_counts.override_read.saturating_add(1);
                stats.override_read_total_duration_ms =
                    stats.override_read_total_duration_ms.saturating_add(elapsed_ms);
                if let Some(slot) = stats.override_read_latency_histogram.get_mut(bucket_index) {
                    *slot = slot.saturating_add(1);
                }
            }
            SqlitePerfOp::Write => {
                stats.op_counts.write = stats.op_counts.write.saturating_add(1);
                stats.write_total_duration_ms =
                    stats.write_total_duration_ms.saturating_add(elapsed_ms);
                if let Some(slot) = stats.write_latency_histogram.get_mut(bucket_index) {
                    *slot = slot.saturating_add(1);
                }
            }
        }
        if let Some(message) = db_error {
            match classify_db_error_message(message) {
                SqliteDbErrorKind::Busy => {
                    stats.db_errors.busy = stats.db_errors.busy.saturating_add(1);
                }
                SqliteDbErrorKind::Locked => {
                    stats.db_errors.locked = stats.db_errors.locked.saturating_add(1);
                }
                SqliteDbErrorKind::Other => {
                    stats.db_errors.other = stats.db_errors.other.saturating_add(1);
                }
            }
        }
    }

    /// Returns the next read connection using round-robin selection.
    fn read_connection(&self) -> &Mutex<Connection> {
        let len = self.read_connections.len();
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % len;
        &self.read_connections[index]
    }

    /// Loads every catalog definition ordered by test number.
    fn load_definitions(&self) -> Result<Vec<TestDefinition>, SqliteLedgerError> {
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| SqliteLedgerError::Io("sqlite read mutex poisoned".to_string()))?;
        let mut stmt = guard
            .prepare_cached(
                "SELECT test_id, test_number, name, category, unit, default_threshold FROM \
                 test_definitions ORDER BY test_number ASC",
            )
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        let mut definitions = Vec::new();
        for row in rows {
            let (test_id, test_number, name, category, unit, threshold) =
                row.map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
            definitions
                .push(definition_from_row(test_id, test_number, name, category, unit, threshold)?);
        }
        Ok(definitions)
    }

    /// Loads one catalog definition by test identifier.
    fn load_definition(
        &self,
        test_id: TestId,
    ) -> Result<Option<TestDefinition>, SqliteLedgerError> {
        let encoded = encode_test_id(test_id)?;
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| SqliteLedgerError::Io("sqlite read mutex poisoned".to_string()))?;
        let mut stmt = guard
            .prepare_cached(
                "SELECT test_id, test_number, name, category, unit, default_threshold FROM \
                 test_definitions WHERE test_id = ?1",
            )
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        let row = stmt
            .query_row(params![encoded], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .optional()
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        row.map(|(id, number, name, category, unit, threshold)| {
            definition_from_row(id, number, name, category, unit, threshold)
        })
        .transpose()
    }

    /// Loads every override row for a `(deal_id, test_id)` key via the read
    /// pool, ordered by effective date.
    fn load_key_overrides(
        &self,
        deal_id: &DealId,
        test_id: TestId,
    ) -> Result<Vec<ThresholdOverride>, SqliteLedgerError> {
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| SqliteLedgerError::Io("sqlite read mutex poisoned".to_string()))?;
        load_key_rows(&guard, deal_id, test_id)
    }

    /// Loads every override row for a deal ordered by test number then
    /// effective date.
    fn load_deal_overrides(
        &self,
        deal_id: &DealId,
    ) -> Result<Vec<ThresholdOverride>, SqliteLedgerError> {
        let guard = self
            .read_connection()
            .lock()
            .map_err(|_| SqliteLedgerError::Io("sqlite read mutex poisoned".to_string()))?;
        let mut stmt = guard
            .prepare_cached(
                "SELECT o.override_id, o.deal_id, o.test_id, o.threshold_value, \
                 o.effective_date, o.expiry_date, o.note, o.created_by, o.created_at FROM \
                 deal_threshold_overrides o JOIN test_definitions d ON d.test_id = o.test_id \
                 WHERE o.deal_id = ?1 ORDER BY d.test_number ASC, o.effective_date ASC",
            )
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        let rows = stmt
            .query_map(params![deal_id.as_str()], override_row_tuple)
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        collect_override_rows(rows)
    }

    /// Inserts a new override inside an immediate transaction.
    fn insert_override(&self, draft: &OverrideDraft) -> Result<OverrideId, OverrideError> {
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| OverrideError::Store("sqlite write mutex poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| OverrideError::Store(err.to_string()))?;
        ensure_known_test(&tx, draft)?;
        let existing = load_key_rows(&tx, &draft.deal_id, draft.test_id)?;
        for row in &existing {
            if row.interval.overlaps(&draft.interval) {
                return Err(OverrideError::Overlap {
                    deal_id: draft.deal_id.clone(),
                    test_id: draft.test_id,
                    attempted: draft.interval,
                    existing: row.interval,
                });
            }
        }
        let row_id = insert_override_row(&tx, draft, unix_millis())?;
        tx.commit().map_err(|err| OverrideError::Store(err.to_string()))?;
        row_id_to_override_id(row_id)
    }

    /// Replaces every override for a deal inside one transaction.
    fn replace_deal_overrides(
        &self,
        deal_id: &DealId,
        overrides: &[OverrideDraft],
    ) -> Result<Vec<OverrideId>, OverrideError> {
        validate_replacement_set(deal_id, overrides)?;
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| OverrideError::Store("sqlite write mutex poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| OverrideError::Store(err.to_string()))?;
        for draft in overrides {
            ensure_known_test(&tx, draft)?;
        }
        tx.execute("DELETE FROM deal_threshold_overrides WHERE deal_id = ?1", params![
            deal_id.as_str()
        ])
        .map_err(|err| OverrideError::Store(err.to_string()))?;
        let created_at = unix_millis();
        let mut assigned = Vec::with_capacity(overrides.len());
        for draft in overrides {
            let row_id = insert_override_row(&tx, draft, created_at)?;
            assigned.push(row_id_to_override_id(row_id)?);
        }
        tx.commit().map_err(|err| OverrideError::Store(err.to_string()))?;
        Ok(assigned)
    }
}

// ============================================================================
// SECTION: Trait Implementations
// ============================================================================

impl CatalogStore for SqliteLedgerStore {
    fn get_applicable_tests(
        &self,
        test_numbers: &std::collections::BTreeSet<TestNumber>,
    ) -> Result<BTreeMap<TestId, TestDefinition>, CatalogError> {
        let started = Instant::now();
        let result = self.load_definitions().map_err(CatalogError::from).and_then(|definitions| {
            let by_number: BTreeMap<TestNumber, TestDefinition> = definitions
                .into_iter()
                .map(|definition| (definition.test_number, definition))
                .collect();
            let mut found = BTreeMap::new();
            let mut missing = Vec::new();
            for number in test_numbers {
                match by_number.get(number) {
                    Some(definition) => {
                        found.insert(definition.test_id, definition.clone());
                    }
                    None => missing.push(*number),
                }
            }
            if missing.is_empty() {
                Ok(found)
            } else {
                Err(CatalogError::NotFound {
                    test_numbers: missing,
                })
            }
        });
        self.record_store_op(
            SqlitePerfOp::CatalogRead,
            started.elapsed(),
            result.as_ref().err().and_then(db_error_message_catalog),
        );
        result
    }

    fn get_test(&self, test_id: TestId) -> Result<Option<TestDefinition>, CatalogError> {
        let started = Instant::now();
        let result = self.load_definition(test_id).map_err(CatalogError::from);
        self.record_store_op(
            SqlitePerfOp::CatalogRead,
            started.elapsed(),
            result.as_ref().err().and_then(db_error_message_catalog),
        );
        result
    }
}

impl OverrideStore for SqliteLedgerStore {
    fn get_active_override(
        &self,
        deal_id: &DealId,
        test_id: TestId,
        as_of: Date,
    ) -> Result<Option<ThresholdOverride>, OverrideError> {
        let started = Instant::now();
        let result = self
            .load_key_overrides(deal_id, test_id)
            .map_err(OverrideError::from)
            .and_then(|rows| {
                let mut active: Vec<ThresholdOverride> =
                    rows.into_iter().filter(|row| row.interval.contains(as_of)).collect();
                match active.len() {
                    0 => Ok(None),
                    1 => Ok(active.pop()),
                    count => Err(OverrideError::Ambiguous {
                        deal_id: deal_id.clone(),
                        test_id,
                        as_of,
                        count,
                    }),
                }
            });
        self.record_store_op(
            SqlitePerfOp::OverrideRead,
            started.elapsed(),
            result.as_ref().err().and_then(db_error_message_override),
        );
        result
    }

    fn upsert_override(&self, draft: &OverrideDraft) -> Result<OverrideId, OverrideError> {
        let started = Instant::now();
        let result = self.insert_override(draft);
        self.record_store_op(
            SqlitePerfOp::Write,
            started.elapsed(),
            result.as_ref().err().and_then(db_error_message_override),
        );
        result
    }

    fn bulk_replace_deal_overrides(
        &self,
        deal_id: &DealId,
        overrides: &[OverrideDraft],
    ) -> Result<Vec<OverrideId>, OverrideError> {
        let started = Instant::now();
        let result = self.replace_deal_overrides(deal_id, overrides);
        self.record_store_op(
            SqlitePerfOp::Write,
            started.elapsed(),
            result.as_ref().err().and_then(db_error_message_override),
        );
        result
    }

    fn list_deal_overrides(&self, deal_id: &DealId) -> Result<Vec<ThresholdOverride>, OverrideError> {
        let started = Instant::now();
        let result = self.load_deal_overrides(deal_id).map_err(OverrideError::from);
        self.record_store_op(
            SqlitePerfOp::OverrideRead,
            started.elapsed(),
            result.as_ref().err().and_then(db_error_message_override),
        );
        result
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteLedgerError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteLedgerError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteLedgerError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteLedgerError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteLedgerError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteLedgerError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteLedgerError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteLedgerError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteLedgerConfig) -> Result<Connection, SqliteLedgerError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteLedgerConfig,
) -> Result<(), SqliteLedgerError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteLedgerError> {
    let tx = connection.transaction().map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS test_definitions (
                    test_id INTEGER PRIMARY KEY,
                    test_number INTEGER NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    unit TEXT NOT NULL,
                    default_threshold TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS deal_threshold_overrides (
                    override_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    deal_id TEXT NOT NULL,
                    test_id INTEGER NOT NULL REFERENCES test_definitions(test_id),
                    threshold_value TEXT NOT NULL,
                    effective_date TEXT NOT NULL,
                    expiry_date TEXT,
                    note TEXT,
                    created_by TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    UNIQUE (deal_id, test_id, effective_date)
                );
                CREATE INDEX IF NOT EXISTS idx_overrides_key
                    ON deal_threshold_overrides (deal_id, test_id, effective_date);",
            )
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteLedgerError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Encodes a test identifier for storage.
fn encode_test_id(test_id: TestId) -> Result<i64, SqliteLedgerError> {
    i64::try_from(test_id.get()).map_err(|_| {
        SqliteLedgerError::Invalid(format!("test id exceeds storage range: {test_id}"))
    })
}

/// Formats a date as ISO-8601 text for storage.
fn format_date(date: Date) -> Result<String, SqliteLedgerError> {
    date.format(DATE_FORMAT)
        .map_err(|err| SqliteLedgerError::Invalid(format!("unformattable date: {err}")))
}

/// Parses an ISO-8601 date from stored text.
fn parse_date(text: &str) -> Result<Date, SqliteLedgerError> {
    Date::parse(text, DATE_FORMAT)
        .map_err(|_| SqliteLedgerError::Corrupt(format!("unparsable stored date: {text}")))
}

/// Parses a decimal threshold from stored text.
fn parse_decimal(text: &str) -> Result<BigDecimal, SqliteLedgerError> {
    BigDecimal::from_str(text)
        .map_err(|_| SqliteLedgerError::Corrupt(format!("unparsable stored decimal: {text}")))
}

/// Decodes a catalog definition from raw column values.
fn definition_from_row(
    test_id: i64,
    test_number: i64,
    name: String,
    category: String,
    unit: String,
    threshold: String,
) -> Result<TestDefinition, SqliteLedgerError> {
    let raw_id = u64::try_from(test_id)
        .map_err(|_| SqliteLedgerError::Corrupt(format!("negative stored test id: {test_id}")))?;
    let test_id = TestId::from_raw(raw_id)
        .ok_or_else(|| SqliteLedgerError::Corrupt("zero stored test id".to_string()))?;
    let raw_number = u32::try_from(test_number).map_err(|_| {
        SqliteLedgerError::Corrupt(format!("stored test number out of range: {test_number}"))
    })?;
    let category = TestCategory::parse(&category)
        .ok_or_else(|| SqliteLedgerError::Corrupt(format!("unknown stored category: {category}")))?;
    let unit = ThresholdUnit::parse(&unit)
        .ok_or_else(|| SqliteLedgerError::Corrupt(format!("unknown stored unit: {unit}")))?;
    Ok(TestDefinition {
        test_id,
        test_number: TestNumber::new(raw_number),
        name,
        category,
        default_threshold: parse_decimal(&threshold)?,
        unit,
    })
}

/// Raw column tuple for one override row.
type OverrideRowTuple =
    (i64, String, i64, String, String, Option<String>, Option<String>, String, i64);

/// Maps one `SQLite` row into the raw override column tuple.
fn override_row_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<OverrideRowTuple> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

/// Decodes an override record from raw column values.
fn override_from_row(raw: OverrideRowTuple) -> Result<ThresholdOverride, SqliteLedgerError> {
    let (override_id, deal_id, test_id, value, effective, expiry, note, created_by, created_at) =
        raw;
    let raw_override = u64::try_from(override_id).map_err(|_| {
        SqliteLedgerError::Corrupt(format!("negative stored override id: {override_id}"))
    })?;
    let override_id = OverrideId::from_raw(raw_override)
        .ok_or_else(|| SqliteLedgerError::Corrupt("zero stored override id".to_string()))?;
    let raw_test = u64::try_from(test_id)
        .map_err(|_| SqliteLedgerError::Corrupt(format!("negative stored test id: {test_id}")))?;
    let test_id = TestId::from_raw(raw_test)
        .ok_or_else(|| SqliteLedgerError::Corrupt("zero stored test id".to_string()))?;
    let effective = parse_date(&effective)?;
    let expiry = expiry.as_deref().map(parse_date).transpose()?;
    let interval = EffectiveInterval::new(effective, expiry).map_err(|err| {
        SqliteLedgerError::Corrupt(format!("inverted stored interval: {err}"))
    })?;
    Ok(ThresholdOverride {
        override_id,
        deal_id: DealId::new(deal_id),
        test_id,
        value: parse_decimal(&value)?,
        interval,
        note,
        created_by: AnalystId::new(created_by),
        created_at,
    })
}

/// Collects mapped override rows, converting row errors.
fn collect_override_rows<I>(rows: I) -> Result<Vec<ThresholdOverride>, SqliteLedgerError>
where
    I: Iterator<Item = rusqlite::Result<OverrideRowTuple>>,
{
    let mut overrides = Vec::new();
    for row in rows {
        let raw = row.map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        overrides.push(override_from_row(raw)?);
    }
    Ok(overrides)
}

/// Loads every override row for a key on the given connection, ordered by
/// effective date. Shared by the read pool and the write transaction so the
/// overlap check observes transaction-local state.
fn load_key_rows(
    connection: &Connection,
    deal_id: &DealId,
    test_id: TestId,
) -> Result<Vec<ThresholdOverride>, SqliteLedgerError> {
    let encoded = encode_test_id(test_id)?;
    let mut stmt = connection
        .prepare_cached(&format!(
            "SELECT {OVERRIDE_COLUMNS} FROM deal_threshold_overrides WHERE deal_id = ?1 AND \
             test_id = ?2 ORDER BY effective_date ASC"
        ))
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    let rows = stmt
        .query_map(params![deal_id.as_str(), encoded], override_row_tuple)
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    collect_override_rows(rows)
}

/// Verifies the draft's test exists in the catalog.
fn ensure_known_test(connection: &Connection, draft: &OverrideDraft) -> Result<(), OverrideError> {
    let encoded = encode_test_id(draft.test_id).map_err(OverrideError::from)?;
    let known: Option<i64> = connection
        .query_row("SELECT 1 FROM test_definitions WHERE test_id = ?1", params![encoded], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| OverrideError::Store(err.to_string()))?;
    if known.is_none() {
        return Err(OverrideError::Invalid {
            deal_id: draft.deal_id.clone(),
            test_id: draft.test_id,
            message: "unknown test identifier".to_string(),
        });
    }
    Ok(())
}

/// Inserts one override row and returns the assigned rowid.
fn insert_override_row(
    connection: &Connection,
    draft: &OverrideDraft,
    created_at: i64,
) -> Result<i64, OverrideError> {
    let encoded = encode_test_id(draft.test_id).map_err(OverrideError::from)?;
    let effective = format_date(draft.interval.effective).map_err(OverrideError::from)?;
    let expiry = draft
        .interval
        .expiry
        .map(format_date)
        .transpose()
        .map_err(OverrideError::from)?;
    connection
        .execute(
            "INSERT INTO deal_threshold_overrides (deal_id, test_id, threshold_value, \
             effective_date, expiry_date, note, created_by, created_at) VALUES (?1, ?2, ?3, ?4, \
             ?5, ?6, ?7, ?8)",
            params![
                draft.deal_id.as_str(),
                encoded,
                draft.value.to_string(),
                effective,
                expiry,
                draft.note,
                draft.created_by.as_str(),
                created_at,
            ],
        )
        .map_err(|err| map_override_write_error(draft, err))?;
    Ok(connection.last_insert_rowid())
}

/// Converts an assigned `SQLite` rowid into an override identifier.
fn row_id_to_override_id(row_id: i64) -> Result<OverrideId, OverrideError> {
    let raw = u64::try_from(row_id)
        .map_err(|_| OverrideError::Store(format!("sqlite assigned negative rowid: {row_id}")))?;
    OverrideId::from_raw(raw)
        .ok_or_else(|| OverrideError::Store("sqlite assigned zero rowid".to_string()))
}

/// Maps insert failures to typed override errors.
fn map_override_write_error(draft: &OverrideDraft, error: rusqlite::Error) -> OverrideError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &error
        && failure.code == ErrorCode::ConstraintViolation
    {
        return OverrideError::Invalid {
            deal_id: draft.deal_id.clone(),
            test_id: draft.test_id,
            message: format!("constraint violation: {error}"),
        };
    }
    OverrideError::Store(error.to_string())
}

/// Maps catalog write failures, surfacing constraint violations as invalid.
fn map_catalog_write_error(error: rusqlite::Error) -> SqliteLedgerError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &error
        && failure.code == ErrorCode::ConstraintViolation
    {
        return SqliteLedgerError::Invalid(format!("catalog constraint violation: {error}"));
    }
    SqliteLedgerError::Db(error.to_string())
}

/// Validates a bulk replacement set before touching the database.
fn validate_replacement_set(
    deal_id: &DealId,
    overrides: &[OverrideDraft],
) -> Result<(), OverrideError> {
    for draft in overrides {
        if draft.deal_id != *deal_id {
            return Err(OverrideError::Invalid {
                deal_id: draft.deal_id.clone(),
                test_id: draft.test_id,
                message: format!("draft deal does not match replacement target {deal_id}"),
            });
        }
    }
    for (index, draft) in overrides.iter().enumerate() {
        for other in overrides.iter().skip(index.saturating_add(1)) {
            if draft.test_id == other.test_id && draft.interval.overlaps(&other.interval) {
                return Err(OverrideError::Overlap {
                    deal_id: deal_id.clone(),
                    test_id: draft.test_id,
                    attempted: other.interval,
                    existing: draft.interval,
                });
            }
        }
    }
    Ok(())
}
