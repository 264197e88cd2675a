// crates/state-store-sql/src/config.rs
// ============================================================================
// Module: SQL Store Configuration
// Description: Configuration model, validation, and TOML loading.
// Purpose: Resolve a validated, immutable store configuration up front.
// Dependencies: serde, thiserror, toml
// ============================================================================

//! ## Overview
//! A [`StoreConfig`] names the backing store (`uri`), the table that holds the
//! records (`collection`), the statement logging mode, and the connection
//! pool policy. [`ensure_config`] is the single validation entry point: it
//! rejects a missing config or URI and fills in the default collection.
//! Configuration files are TOML and are read with a hard size limit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::logging::StatementLogger;
use crate::logging::StatementLogging;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Table name used when no collection is configured.
pub const DEFAULT_COLLECTION: &str = "state";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Default maximum pooled connections.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
/// Default minimum idle pooled connections.
const DEFAULT_MIN_IDLE: u32 = 0;
/// Default pool acquire timeout (ms).
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;
/// Default idle eviction timeout (ms).
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10_000;
/// Default `SQLite` busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors raised before a store is created.
///
/// # Invariants
/// - Messages never embed the connection URI, which may carry credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No configuration was supplied.
    #[error("store config is required")]
    Missing,
    /// The connection URI is absent or blank.
    #[error("store config uri is required")]
    UriMissing,
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for state_store_core::StorageError {
    fn from(error: ConfigError) -> Self {
        Self::Invalid(error.to_string())
    }
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Write atomicity policy for a single `write` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAtomicity {
    /// Each key is its own statement; a failure leaves earlier keys written.
    #[default]
    PerKey,
    /// All keys of one `write` commit in a single transaction.
    Batch,
}

/// Connection pool policy.
///
/// # Invariants
/// - `max_connections` is greater than zero.
/// - `min_idle` does not exceed `max_connections`.
/// - `acquire_timeout_ms` is greater than zero.
/// - `idle_timeout_ms` of zero disables idle eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Minimum idle connections kept open.
    pub min_idle: u32,
    /// Maximum wait for a free connection, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// Idle time after which a connection is evicted, in milliseconds.
    pub idle_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_idle: DEFAULT_MIN_IDLE,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

impl PoolConfig {
    /// Returns the acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Returns the idle eviction timeout, if enabled.
    #[must_use]
    pub const fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.idle_timeout_ms))
        }
    }

    /// Validates pool limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.min_idle > self.max_connections {
            return Err(ConfigError::Invalid(format!(
                "pool.min_idle ({}) exceeds pool.max_connections ({})",
                self.min_idle, self.max_connections
            )));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "pool.acquire_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Relational key-value store configuration.
///
/// # Invariants
/// - After [`ensure_config`], `uri` is non-blank and `collection` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Connection URI (`postgres://`, `postgresql://`, or `sqlite:`).
    pub uri: String,
    /// Table holding the records; blank resolves to [`DEFAULT_COLLECTION`].
    pub collection: Option<String>,
    /// Statement logging mode.
    pub logging: StatementLogging,
    /// Connection pool policy.
    pub pool: PoolConfig,
    /// Write atomicity policy.
    pub write_atomicity: WriteAtomicity,
    /// `SQLite` busy timeout in milliseconds (ignored by Postgres).
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            collection: None,
            logging: StatementLogging::Disabled,
            pool: PoolConfig::default(),
            write_atomicity: WriteAtomicity::PerKey,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for `uri` with every other field defaulted.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Sets the collection (table) name.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets the statement logging mode.
    #[must_use]
    pub fn with_logging(mut self, logging: StatementLogging) -> Self {
        self.logging = logging;
        self
    }

    /// Installs a caller-supplied statement logger.
    #[must_use]
    pub fn with_statement_logger(self, logger: impl StatementLogger + 'static) -> Self {
        self.with_logging(StatementLogging::custom(logger))
    }

    /// Sets the connection pool policy.
    #[must_use]
    pub const fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Sets the write atomicity policy.
    #[must_use]
    pub const fn with_write_atomicity(mut self, write_atomicity: WriteAtomicity) -> Self {
        self.write_atomicity = write_atomicity;
        self
    }

    /// Returns the effective collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self.collection.as_deref() {
            Some(collection) if !collection.trim().is_empty() => collection,
            _ => DEFAULT_COLLECTION,
        }
    }

    /// Returns the `SQLite` busy timeout.
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Validates pool and timeout limits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a limit is out of range.
    pub fn validate_limits(&self) -> Result<(), ConfigError> {
        self.pool.validate()
    }

    /// Parses, resolves, and validates a TOML configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let config = ensure_config(Some(config))?;
        config.validate_limits()?;
        Ok(config)
    }

    /// Loads a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing, or validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a configuration and resolves defaults.
///
/// Idempotent: a resolved configuration passes through unchanged.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] when `config` is `None` and
/// [`ConfigError::UriMissing`] when the URI is empty or whitespace.
pub fn ensure_config(config: Option<StoreConfig>) -> Result<StoreConfig, ConfigError> {
    let mut config = config.ok_or(ConfigError::Missing)?;
    if config.uri.trim().is_empty() {
        return Err(ConfigError::UriMissing);
    }
    let blank = config.collection.as_deref().is_none_or(|collection| collection.trim().is_empty());
    if blank {
        config.collection = Some(DEFAULT_COLLECTION.to_string());
    }
    Ok(config)
}
