// crates/state-store-sql/src/session/mod.rs
// ============================================================================
// Module: Store Sessions
// Description: Pooled sessions against the supported backing stores.
// Purpose: Run schema, read, upsert, and delete statements on a pool.
// Dependencies: r2d2, postgres, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! A [`Session`] owns one bounded connection pool plus the resolved table
//! name. Every method is blocking and is expected to run on a blocking
//! thread. Opening a session ensures the schema before returning, so a
//! session that exists is always usable against a correctly shaped table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Serialize;
use state_store_core::StorageError;
use state_store_core::StoreItems;
use state_store_core::is_storable_key;

use crate::config::StoreConfig;
use crate::config::WriteAtomicity;
use crate::dialect::ConnectionTarget;
use crate::session::postgres::PostgresSession;
use crate::session::sqlite::SqliteSession;

mod postgres;
mod sqlite;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Connection pool occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Open connections (idle and in use).
    pub connections: u32,
    /// Idle connections.
    pub idle_connections: u32,
}

impl From<r2d2::State> for PoolStats {
    fn from(state: r2d2::State) -> Self {
        Self {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }
}

/// Pooled session against one backing store.
pub(crate) enum Session {
    /// Postgres session.
    Postgres(PostgresSession),
    /// `SQLite` session.
    Sqlite(SqliteSession),
}

impl Session {
    /// Builds the pool for the configured URI and ensures the schema.
    ///
    /// A pool whose schema setup fails is dropped before returning.
    pub(crate) fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        let session = match ConnectionTarget::parse(&config.uri)? {
            ConnectionTarget::Postgres(uri) => Self::Postgres(PostgresSession::open(&uri, config)?),
            ConnectionTarget::Sqlite(location) => {
                Self::Sqlite(SqliteSession::open(location, config)?)
            }
        };
        session.ensure_schema()?;
        Ok(session)
    }

    /// Creates the store table when absent.
    pub(crate) fn ensure_schema(&self) -> Result<(), StorageError> {
        match self {
            Self::Postgres(session) => session.ensure_schema(),
            Self::Sqlite(session) => session.ensure_schema(),
        }
    }

    /// Fetches the stored values for `keys`, ordered as requested.
    pub(crate) fn select(&self, keys: &[String]) -> Result<StoreItems, StorageError> {
        let unique = unique_keys(keys);
        let mut found = match self {
            Self::Postgres(session) => session.select(&unique)?,
            Self::Sqlite(session) => session.select(&unique)?,
        };
        let mut items = StoreItems::new();
        for key in unique {
            if let Some(value) = found.shift_remove(&key) {
                items.insert(key, value);
            }
        }
        Ok(items)
    }

    /// Upserts every entry in `changes`, stopping at the first failure.
    pub(crate) fn upsert(
        &self,
        changes: &StoreItems,
        atomicity: WriteAtomicity,
    ) -> Result<(), StorageError> {
        match self {
            Self::Postgres(session) => session.upsert(changes, atomicity),
            Self::Sqlite(session) => session.upsert(changes, atomicity),
        }
    }

    /// Deletes every row whose id is in `keys`.
    pub(crate) fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        let unique = unique_keys(keys);
        match self {
            Self::Postgres(session) => session.delete(&unique),
            Self::Sqlite(session) => session.delete(&unique),
        }
    }

    /// Runs a trivial statement to prove the pool can serve queries.
    pub(crate) fn check_ready(&self) -> Result<(), StorageError> {
        match self {
            Self::Postgres(session) => session.check_ready(),
            Self::Sqlite(session) => session.check_ready(),
        }
    }

    /// Returns pool occupancy.
    pub(crate) fn stats(&self) -> PoolStats {
        match self {
            Self::Postgres(session) => session.stats(),
            Self::Sqlite(session) => session.stats(),
        }
    }
}

/// Deduplicates keys while keeping first-seen order.
///
/// Keys that no write can store are dropped; they match no row and some
/// drivers refuse to bind them.
fn unique_keys(keys: &[String]) -> Vec<String> {
    let mut seen: BTreeSet<&String> = BTreeSet::new();
    keys.iter().filter(|key| is_storable_key(key) && seen.insert(*key)).cloned().collect()
}

/// Maps a pool checkout failure (including acquire timeout).
fn pool_error(err: &r2d2::Error) -> StorageError {
    StorageError::Connection(format!("connection pool unavailable: {err}"))
}

/// Serializes a value for storage as JSON text.
fn encode_value(value: &serde_json::Value) -> Result<String, StorageError> {
    serde_json::to_string(value)
        .map_err(|err| StorageError::Invalid(format!("value is not serializable: {err}")))
}
