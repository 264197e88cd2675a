// crates/state-store-sql/src/session/postgres.rs
// ============================================================================
// Module: Postgres Session
// Description: Pooled Postgres session for the key-value table.
// Purpose: Execute key-value statements against Postgres via r2d2.
// Dependencies: postgres, r2d2, r2d2_postgres, serde_json
// ============================================================================

//! ## Overview
//! Payloads are bound as `JSON` parameters and read back as
//! [`serde_json::Value`]. Key sets bind as a single text array, so read and
//! delete are one statement regardless of batch size.

// ============================================================================
// SECTION: Imports
// ============================================================================

use postgres::GenericClient;
use postgres::NoTls;
use postgres::types::ToSql;
use r2d2::Pool;
use r2d2::PooledConnection;
use r2d2_postgres::PostgresConnectionManager;
use serde_json::Value;
use state_store_core::StorageError;
use state_store_core::StoreItems;

use super::PoolStats;
use super::pool_error;
use crate::config::StoreConfig;
use crate::config::WriteAtomicity;
use crate::dialect::Dialect;
use crate::dialect::READINESS_SQL;
use crate::dialect::quote_identifier;
use crate::logging::StatementLogging;

// ============================================================================
// SECTION: Session
// ============================================================================

/// Pooled Postgres session.
///
/// # Invariants
/// - `pool` is `Some` until the session is dropped.
pub(crate) struct PostgresSession {
    /// Connection pool for Postgres access.
    pool: Option<Pool<PostgresConnectionManager<NoTls>>>,
    /// Quoted table identifier.
    table: String,
    /// Statement logging hook.
    logging: StatementLogging,
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        // The blocking client owns a runtime that must not drop on an async worker.
        if let Some(pool) = self.pool.take() {
            let _ = std::thread::spawn(move || drop(pool));
        }
    }
}

impl PostgresSession {
    /// Builds a bounded pool for `uri`.
    pub(crate) fn open(uri: &str, config: &StoreConfig) -> Result<Self, StorageError> {
        let mut pg_config = uri
            .parse::<postgres::Config>()
            .map_err(|err| StorageError::Connection(format!("invalid postgres uri: {err}")))?;
        pg_config.connect_timeout(config.pool.acquire_timeout());
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(config.pool.max_connections)
            .min_idle(Some(config.pool.min_idle))
            .connection_timeout(config.pool.acquire_timeout())
            .idle_timeout(config.pool.idle_timeout())
            .build(manager)
            .map_err(|err| StorageError::Connection(err.to_string()))?;
        Ok(Self {
            pool: Some(pool),
            table: quote_identifier(config.collection()),
            logging: config.logging.clone(),
        })
    }

    /// Checks out a pooled connection.
    fn connection(
        &self,
    ) -> Result<PooledConnection<PostgresConnectionManager<NoTls>>, StorageError> {
        self.pool
            .as_ref()
            .ok_or_else(|| StorageError::Connection("postgres session closed".to_string()))?
            .get()
            .map_err(|err| pool_error(&err))
    }

    /// Creates the store table when absent.
    pub(crate) fn ensure_schema(&self) -> Result<(), StorageError> {
        let sql = Dialect::Postgres.create_table(&self.table);
        let mut conn = self.connection()?;
        self.logging
            .timed(&sql, || conn.batch_execute(&sql))
            .map_err(|err| query_error(&err))
    }

    /// Fetches rows whose id is in `keys`.
    pub(crate) fn select(&self, keys: &[String]) -> Result<StoreItems, StorageError> {
        let sql = Dialect::Postgres.select(&self.table, keys.len());
        let mut conn = self.connection()?;
        let rows = self
            .logging
            .timed(&sql, || conn.query(sql.as_str(), &[&keys]))
            .map_err(|err| query_error(&err))?;
        let mut items = StoreItems::new();
        for row in rows {
            let id: String = row.try_get(0).map_err(|err| StorageError::Corrupt(err.to_string()))?;
            let data: Value =
                row.try_get(1).map_err(|err| StorageError::Corrupt(err.to_string()))?;
            items.insert(id, data);
        }
        Ok(items)
    }

    /// Upserts every entry, in order, stopping at the first failure.
    pub(crate) fn upsert(
        &self,
        changes: &StoreItems,
        atomicity: WriteAtomicity,
    ) -> Result<(), StorageError> {
        let sql = Dialect::Postgres.upsert(&self.table);
        let mut conn = self.connection()?;
        match atomicity {
            WriteAtomicity::PerKey => self.upsert_each(&mut *conn, &sql, changes),
            WriteAtomicity::Batch => {
                let mut tx =
                    conn.transaction().map_err(|err| query_error(&err))?;
                self.upsert_each(&mut tx, &sql, changes)?;
                tx.commit().map_err(|err| query_error(&err))
            }
        }
    }

    /// Issues one upsert statement per entry on `client`.
    fn upsert_each<C: GenericClient>(
        &self,
        client: &mut C,
        sql: &str,
        changes: &StoreItems,
    ) -> Result<(), StorageError> {
        let statement = client.prepare(sql).map_err(|err| query_error(&err))?;
        for (key, value) in changes {
            let params: [&(dyn ToSql + Sync); 2] = [key, value];
            self.logging
                .timed(sql, || client.execute(&statement, &params))
                .map_err(|err| query_error(&err))?;
        }
        Ok(())
    }

    /// Deletes rows whose id is in `keys`.
    pub(crate) fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        let sql = Dialect::Postgres.delete(&self.table, keys.len());
        let mut conn = self.connection()?;
        self.logging
            .timed(&sql, || conn.execute(sql.as_str(), &[&keys]))
            .map_err(|err| query_error(&err))?;
        Ok(())
    }

    /// Runs the readiness check.
    pub(crate) fn check_ready(&self) -> Result<(), StorageError> {
        let mut conn = self.connection()?;
        self.logging
            .timed(READINESS_SQL, || conn.batch_execute(READINESS_SQL))
            .map_err(|err| query_error(&err))
    }

    /// Returns pool occupancy.
    pub(crate) fn stats(&self) -> PoolStats {
        self.pool.as_ref().map_or(
            PoolStats {
                connections: 0,
                idle_connections: 0,
            },
            |pool| PoolStats::from(pool.state()),
        )
    }
}

/// Maps a driver error, keeping the server-side message and SQLSTATE.
///
/// The driver's own display collapses server errors to "db error".
fn query_error(err: &postgres::Error) -> StorageError {
    match err.as_db_error() {
        Some(db) => StorageError::Query(format!(
            "{err}: {} (sqlstate {})",
            db.message(),
            db.code().code()
        )),
        None => StorageError::Query(err.to_string()),
    }
}
