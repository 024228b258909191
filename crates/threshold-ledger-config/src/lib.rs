// crates/threshold-ledger-config/src/lib.rs
// ============================================================================
// Module: Threshold Ledger Config
// Description: TOML configuration model, loading, and validation.
// Purpose: Provide strict, fail-closed configuration for ledger tooling.
// Dependencies: serde, thiserror, toml, threshold-ledger-store-sqlite
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file and validated before any store is
//! opened. Loading is strict and fail-closed: overlong paths, oversized
//! files, and non-UTF-8 content are rejected with typed errors rather than
//! being coerced. There are no environment fallbacks baked into the model.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use threshold_ledger_store_sqlite::SqliteLedgerConfig;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config file name used when no path is provided.
const DEFAULT_CONFIG_PATH: &str = "threshold-ledger.toml";
/// Maximum accepted config file size in bytes.
const MAX_CONFIG_BYTES: u64 = 1_048_576;
/// Maximum length of a single config path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total config path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
///
/// # Invariants
/// - Error messages are stable; tooling matches on their text.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file could not be parsed as TOML.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config content failed validation.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Catalog seeding configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// Optional path to a JSON file of test definitions used for seeding.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

/// Root configuration for ledger tooling.
///
/// # Invariants
/// - `store` passes [`ThresholdLedgerConfig::validate`] before use.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdLedgerConfig {
    /// SQLite store configuration.
    pub store: SqliteLedgerConfig,
    /// Catalog seeding configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl ThresholdLedgerConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// When `path` is `None` the default `threshold-ledger.toml` in the
    /// working directory is used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path violates safety limits, the file
    /// cannot be read, exceeds the size cap, is not UTF-8, fails to parse, or
    /// fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        validate_config_path(path)?;
        let metadata =
            std::fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_BYTES {
            return Err(ConfigError::Invalid(format!(
                "config file exceeds size limit: {} bytes (max {MAX_CONFIG_BYTES})",
                metadata.len()
            )));
        }
        let bytes = std::fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration content.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a limit is zero or the store
    /// path is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store path must not be empty".to_string()));
        }
        if self.store.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "busy_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.store.read_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates config file paths for safety limits.
fn validate_config_path(path: &Path) -> Result<(), ConfigError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(
            "config path exceeds max length".to_string(),
        ));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}
