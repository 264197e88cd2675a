// crates/state-store-sql/src/lib.rs
// ============================================================================
// Module: State Store SQL Library
// Description: Relational backend for the key-value storage contract.
// Purpose: Persist JSON records in a single SQL table keyed by string id.
// Dependencies: state-store-core, postgres, r2d2, rusqlite, tokio, tracing
// ============================================================================

//! ## Overview
//! This crate maps the [`Storage`] contract onto one relational table with a
//! `VARCHAR(500)` primary key column `id` and a JSON column `data`. The table
//! is created on first connect. Postgres and `SQLite` are supported, selected
//! by the connection URI scheme.
//!
//! ```no_run
//! use serde_json::json;
//! use state_store_sql::SqlKeyValueStore;
//! use state_store_sql::Storage;
//! use state_store_sql::StoreConfig;
//! use state_store_sql::StoreItems;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqlKeyValueStore::new(StoreConfig::new("sqlite://state.db"))?;
//! let mut changes = StoreItems::new();
//! changes.insert("conversation-1".to_string(), json!({ "turns": 3 }));
//! store.write(changes).await?;
//! let items = store.read(&["conversation-1".to_string()]).await?;
//! assert_eq!(items.len(), 1);
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
mod dialect;
pub mod logging;
mod session;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::DEFAULT_COLLECTION;
pub use config::PoolConfig;
pub use config::StoreConfig;
pub use config::WriteAtomicity;
pub use config::ensure_config;
pub use logging::SESSION_TARGET;
pub use logging::STATEMENT_TARGET;
pub use logging::StatementLogger;
pub use logging::StatementLogging;
pub use session::PoolStats;
pub use state_store_core::Storage;
pub use state_store_core::StorageError;
pub use state_store_core::StoreItems;
pub use store::ConnectionState;
pub use store::SqlKeyValueStore;
