// crates/state-store-sql/src/dialect.rs
// ============================================================================
// Module: SQL Dialects
// Description: Connection URI resolution and per-dialect statement text.
// Purpose: Keep every SQL string the store issues in one auditable place.
// Dependencies: state-store-core
// ============================================================================

//! ## Overview
//! The store speaks two dialects. Postgres binds key sets as one array
//! parameter (`id = ANY($1)`) and stores payloads as `JSON`; `SQLite` expands
//! key sets into numbered placeholders and stores payloads as JSON text in a
//! `TEXT` column.
//! Table names are always emitted as quoted identifiers, so a configured
//! collection name is used verbatim and never spliced in as SQL.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write;
use std::path::Path;
use std::path::PathBuf;

use state_store_core::MAX_KEY_LENGTH;
use state_store_core::StorageError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum keys bound into one `SQLite` statement.
pub(crate) const SQLITE_MAX_KEYS_PER_STATEMENT: usize = 500;
/// Maximum total `SQLite` database path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Statement used for readiness checks.
pub(crate) const READINESS_SQL: &str = "SELECT 1";

// ============================================================================
// SECTION: Connection Targets
// ============================================================================

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    /// `PostgreSQL`.
    Postgres,
    /// `SQLite`.
    Sqlite,
}

/// `SQLite` database location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SqliteLocation {
    /// On-disk database file.
    File(PathBuf),
    /// Private in-memory database.
    Memory,
}

/// Backing store resolved from a connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionTarget {
    /// Postgres connection string (passed to the driver unchanged).
    Postgres(String),
    /// `SQLite` database.
    Sqlite(SqliteLocation),
}

impl ConnectionTarget {
    /// Resolves a connection URI by scheme.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] for unsupported schemes or unsafe
    /// `SQLite` paths. Messages never echo the URI.
    pub(crate) fn parse(uri: &str) -> Result<Self, StorageError> {
        let uri = uri.trim();
        if uri.starts_with("postgres://") || uri.starts_with("postgresql://") {
            return Ok(Self::Postgres(uri.to_string()));
        }
        let path = if let Some(rest) = uri.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = uri.strip_prefix("sqlite:") {
            rest
        } else {
            return Err(StorageError::Connection(
                "unsupported connection uri scheme (expected postgres:// or sqlite:)".to_string(),
            ));
        };
        if path == ":memory:" {
            return Ok(Self::Sqlite(SqliteLocation::Memory));
        }
        let path = PathBuf::from(path);
        validate_sqlite_path(&path)?;
        Ok(Self::Sqlite(SqliteLocation::File(path)))
    }
}

/// Validates a `SQLite` database path against length and shape limits.
fn validate_sqlite_path(path: &Path) -> Result<(), StorageError> {
    let path_string = path.to_string_lossy();
    if path_string.is_empty() {
        return Err(StorageError::Connection("sqlite uri is missing a database path".to_string()));
    }
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(StorageError::Connection("sqlite path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(StorageError::Connection(
                "sqlite path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(StorageError::Connection(
            "sqlite path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Quotes an identifier, doubling embedded quotes.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Dialect {
    /// Returns the `CREATE TABLE IF NOT EXISTS` statement for `table`.
    pub(crate) fn create_table(self, table: &str) -> String {
        let data_type = match self {
            // JSON keeps the text verbatim; JSONB rejects `\u0000` escapes.
            Self::Postgres => "JSON",
            // TEXT affinity keeps numeric payloads such as `42` stored as text.
            Self::Sqlite => "TEXT",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (id VARCHAR({MAX_KEY_LENGTH}) NOT NULL PRIMARY \
             KEY, data {data_type} NOT NULL)"
        )
    }

    /// Returns the single-row upsert statement for `table`.
    pub(crate) fn upsert(self, table: &str) -> String {
        let (id, data) = match self {
            Self::Postgres => ("$1", "$2"),
            Self::Sqlite => ("?1", "?2"),
        };
        format!(
            "INSERT INTO {table} (id, data) VALUES ({id}, {data}) ON CONFLICT (id) DO UPDATE SET \
             data = excluded.data"
        )
    }

    /// Returns the select statement for a key set of `count` keys.
    pub(crate) fn select(self, table: &str, count: usize) -> String {
        format!("SELECT id, data FROM {table} WHERE {}", self.key_filter(count))
    }

    /// Returns the delete statement for a key set of `count` keys.
    pub(crate) fn delete(self, table: &str, count: usize) -> String {
        format!("DELETE FROM {table} WHERE {}", self.key_filter(count))
    }

    /// Builds the `WHERE` predicate matching a key set.
    fn key_filter(self, count: usize) -> String {
        match self {
            Self::Postgres => "id = ANY($1)".to_string(),
            Self::Sqlite => {
                let mut filter = String::from("id IN (");
                for index in 1..=count {
                    if index > 1 {
                        filter.push_str(", ");
                    }
                    let _ = write!(filter, "?{index}");
                }
                filter.push(')');
                filter
            }
        }
    }
}

#[cfg(test)]
mod tests;
