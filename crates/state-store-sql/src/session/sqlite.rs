// crates/state-store-sql/src/session/sqlite.rs
// ============================================================================
// Module: SQLite Session
// Description: Pooled SQLite session for the key-value table.
// Purpose: Execute key-value statements against SQLite via r2d2.
// Dependencies: r2d2, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! `SQLite` connections are pooled with a small r2d2 manager. File databases
//! run in WAL mode with a busy timeout so pooled readers and writers can
//! interleave. A private in-memory database lives only as long as its
//! connection, so memory targets use exactly one connection that is never
//! evicted. Payloads are stored as JSON text and parsed on read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use r2d2::ManageConnection;
use r2d2::Pool;
use r2d2::PooledConnection;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use serde_json::Value;
use state_store_core::StorageError;
use state_store_core::StoreItems;

use super::PoolStats;
use super::encode_value;
use super::pool_error;
use crate::config::StoreConfig;
use crate::config::WriteAtomicity;
use crate::dialect::Dialect;
use crate::dialect::READINESS_SQL;
use crate::dialect::SQLITE_MAX_KEYS_PER_STATEMENT;
use crate::dialect::SqliteLocation;
use crate::dialect::quote_identifier;
use crate::logging::StatementLogging;

// ============================================================================
// SECTION: Connection Manager
// ============================================================================

/// r2d2 manager opening `SQLite` connections with store pragmas applied.
#[derive(Debug)]
pub(crate) struct SqliteConnectionManager {
    /// Database location.
    location: SqliteLocation,
    /// Busy timeout applied to every connection.
    busy_timeout: Duration,
}

impl SqliteConnectionManager {
    /// Opens the database file or a private in-memory database.
    fn open(&self) -> Result<Connection, rusqlite::Error> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        match &self.location {
            SqliteLocation::File(path) => open_file(path, flags),
            SqliteLocation::Memory => Connection::open_in_memory_with_flags(flags),
        }
    }
}

/// Opens a database file in WAL mode.
fn open_file(path: &Path, flags: OpenFlags) -> Result<Connection, rusqlite::Error> {
    let connection = Connection::open_with_flags(path, flags)?;
    connection.execute_batch("PRAGMA journal_mode = wal;")?;
    connection.execute_batch("PRAGMA synchronous = normal;")?;
    Ok(connection)
}

impl ManageConnection for SqliteConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let connection = self.open()?;
        connection.busy_timeout(self.busy_timeout)?;
        Ok(connection)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.query_row(READINESS_SQL, [], |row| row.get::<_, i64>(0)).map(|_| ())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Pooled `SQLite` session.
pub(crate) struct SqliteSession {
    /// Connection pool for `SQLite` access.
    pool: Pool<SqliteConnectionManager>,
    /// Quoted table identifier.
    table: String,
    /// Statement logging hook.
    logging: StatementLogging,
}

impl SqliteSession {
    /// Builds a bounded pool for `location`.
    pub(crate) fn open(location: SqliteLocation, config: &StoreConfig) -> Result<Self, StorageError> {
        let builder = Pool::builder().connection_timeout(config.pool.acquire_timeout());
        let builder = match location {
            SqliteLocation::Memory => builder
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None),
            SqliteLocation::File(_) => builder
                .max_size(config.pool.max_connections)
                .min_idle(Some(config.pool.min_idle))
                .idle_timeout(config.pool.idle_timeout()),
        };
        let manager = SqliteConnectionManager {
            location,
            busy_timeout: config.busy_timeout(),
        };
        let pool = builder.build(manager).map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(Self {
            pool,
            table: quote_identifier(config.collection()),
            logging: config.logging.clone(),
        })
    }

    /// Checks out a pooled connection.
    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool.get().map_err(|err| pool_error(&err))
    }

    /// Creates the store table when absent.
    pub(crate) fn ensure_schema(&self) -> Result<(), StorageError> {
        let sql = Dialect::Sqlite.create_table(&self.table);
        let conn = self.connection()?;
        self.logging
            .timed(&sql, || conn.execute_batch(&sql))
            .map_err(|err| StorageError::Query(err.to_string()))
    }

    /// Fetches rows whose id is in `keys`, one statement per key chunk.
    pub(crate) fn select(&self, keys: &[String]) -> Result<StoreItems, StorageError> {
        let conn = self.connection()?;
        let mut items = StoreItems::new();
        for chunk in keys.chunks(SQLITE_MAX_KEYS_PER_STATEMENT) {
            let sql = Dialect::Sqlite.select(&self.table, chunk.len());
            let rows = self
                .logging
                .timed(&sql, || select_rows(&conn, &sql, chunk))
                .map_err(|err| StorageError::Query(err.to_string()))?;
            for (id, data) in rows {
                let value: Value = serde_json::from_str(&data).map_err(|err| {
                    StorageError::Corrupt(format!("stored payload is not valid json: {err}"))
                })?;
                items.insert(id, value);
            }
        }
        Ok(items)
    }

    /// Upserts every entry, in order, stopping at the first failure.
    pub(crate) fn upsert(
        &self,
        changes: &StoreItems,
        atomicity: WriteAtomicity,
    ) -> Result<(), StorageError> {
        let sql = Dialect::Sqlite.upsert(&self.table);
        let mut conn = self.connection()?;
        match atomicity {
            WriteAtomicity::PerKey => self.upsert_each(&conn, &sql, changes),
            WriteAtomicity::Batch => {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(|err| StorageError::Query(err.to_string()))?;
                self.upsert_each(&tx, &sql, changes)?;
                tx.commit().map_err(|err| StorageError::Query(err.to_string()))
            }
        }
    }

    /// Issues one upsert statement per entry on `conn`.
    fn upsert_each(
        &self,
        conn: &Connection,
        sql: &str,
        changes: &StoreItems,
    ) -> Result<(), StorageError> {
        let mut statement =
            conn.prepare_cached(sql).map_err(|err| StorageError::Query(err.to_string()))?;
        for (key, value) in changes {
            let data = encode_value(value)?;
            self.logging
                .timed(sql, || statement.execute(params![key, data]))
                .map_err(|err| StorageError::Query(err.to_string()))?;
        }
        Ok(())
    }

    /// Deletes rows whose id is in `keys`, one statement per key chunk.
    pub(crate) fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        let conn = self.connection()?;
        for chunk in keys.chunks(SQLITE_MAX_KEYS_PER_STATEMENT) {
            let sql = Dialect::Sqlite.delete(&self.table, chunk.len());
            self.logging
                .timed(&sql, || conn.execute(&sql, params_from_iter(chunk.iter())))
                .map_err(|err| StorageError::Query(err.to_string()))?;
        }
        Ok(())
    }

    /// Runs the readiness check.
    pub(crate) fn check_ready(&self) -> Result<(), StorageError> {
        let conn = self.connection()?;
        self.logging
            .timed(READINESS_SQL, || conn.query_row(READINESS_SQL, [], |row| row.get::<_, i64>(0)))
            .map(|_| ())
            .map_err(|err| StorageError::Query(err.to_string()))
    }

    /// Returns pool occupancy.
    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats::from(self.pool.state())
    }
}

/// Runs a select over one key chunk and collects raw rows.
fn select_rows(
    conn: &Connection,
    sql: &str,
    keys: &[String],
) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut statement = conn.prepare(sql)?;
    let rows = statement.query_map(params_from_iter(keys.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    rows.collect()
}
