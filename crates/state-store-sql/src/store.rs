// crates/state-store-sql/src/store.rs
// ============================================================================
// Module: SQL Key-Value Store
// Description: Relational table exposed through the key-value storage contract.
// Purpose: Manage the session lifecycle and run batch read/write/delete.
// Dependencies: state-store-core, tokio, tracing
// ============================================================================

//! ## Overview
//! [`SqlKeyValueStore`] makes one relational table behave like a key-value
//! store: one row per key, upsert on write, bulk fetch and bulk delete by key
//! set. The session is created lazily by the first operation that needs it,
//! shared by every later operation, and released by [`SqlKeyValueStore::close`].
//!
//! Concurrent callers that find the store disconnected converge on a single
//! connect attempt. Empty batches return before any connect. Drivers are
//! blocking, so statements run on tokio's blocking pool.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use state_store_core::Storage;
use state_store_core::StorageError;
use state_store_core::StoreItems;
use state_store_core::validate_keys;
use tokio::sync::Mutex;

use crate::config::ConfigError;
use crate::config::StoreConfig;
use crate::config::ensure_config;
use crate::session::PoolStats;
use crate::session::Session;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; the next operation connects.
    Disconnected,
    /// A session is open and shared by operations.
    Connected,
}

/// Relational key-value store.
///
/// # Invariants
/// - `config` is validated at construction and never mutated.
/// - At most one session is stored at a time.
pub struct SqlKeyValueStore {
    /// Validated store configuration.
    config: StoreConfig,
    /// Current session; the lock is held only while connecting or closing.
    session: Mutex<Option<Arc<Session>>>,
}

impl SqlKeyValueStore {
    /// Creates a store from a configuration without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is invalid.
    pub fn new(config: StoreConfig) -> Result<Self, ConfigError> {
        Self::from_config(Some(config))
    }

    /// Creates a store from an optional configuration without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for `None`, [`ConfigError::UriMissing`]
    /// for a blank URI, and [`ConfigError::Invalid`] for out-of-range limits.
    pub fn from_config(config: Option<StoreConfig>) -> Result<Self, ConfigError> {
        let config = ensure_config(config)?;
        config.validate_limits()?;
        Ok(Self {
            config,
            session: Mutex::new(None),
        })
    }

    /// Returns the validated configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the current session state.
    pub async fn state(&self) -> ConnectionState {
        if self.session.lock().await.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Opens a new session, replacing and releasing any existing one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] when the pool cannot be built and
    /// [`StorageError::Query`] when the schema cannot be ensured. The stored
    /// session is left untouched on failure.
    pub async fn connect(&self) -> Result<(), StorageError> {
        let mut guard = self.session.lock().await;
        let session = self.open_session().await?;
        let previous = guard.replace(session);
        drop(guard);
        if let Some(previous) = previous {
            release(previous).await?;
        }
        Ok(())
    }

    /// Opens a session unless one is already stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when connecting fails.
    pub async fn ensure_connected(&self) -> Result<(), StorageError> {
        self.session().await.map(|_| ())
    }

    /// Releases the session. A no-op when disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Store`] when the release task fails.
    pub async fn close(&self) -> Result<(), StorageError> {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            release(session).await?;
            self.config.logging.lifecycle("state store session closed", self.config.collection());
        }
        Ok(())
    }

    /// Checks that the backing store answers queries, connecting if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store is unavailable.
    pub async fn readiness(&self) -> Result<(), StorageError> {
        let session = self.session().await?;
        run_blocking(move || session.check_ready()).await
    }

    /// Returns pool occupancy, or `None` when disconnected.
    pub async fn pool_stats(&self) -> Option<PoolStats> {
        self.session.lock().await.as_ref().map(|session| session.stats())
    }

    /// Returns the stored session, connecting first when there is none.
    async fn session(&self) -> Result<Arc<Session>, StorageError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(Arc::clone(session));
        }
        let session = self.open_session().await?;
        *guard = Some(Arc::clone(&session));
        drop(guard);
        Ok(session)
    }

    /// Builds a new session on the blocking pool.
    async fn open_session(&self) -> Result<Arc<Session>, StorageError> {
        let config = self.config.clone();
        let session = run_blocking(move || Session::open(&config)).await?;
        self.config.logging.lifecycle("state store session opened", self.config.collection());
        Ok(Arc::new(session))
    }
}

#[async_trait]
impl Storage for SqlKeyValueStore {
    async fn read(&self, keys: &[String]) -> Result<StoreItems, StorageError> {
        if keys.is_empty() {
            return Ok(StoreItems::new());
        }
        let keys = keys.to_vec();
        let session = self.session().await?;
        run_blocking(move || session.select(&keys)).await
    }

    async fn write(&self, changes: StoreItems) -> Result<(), StorageError> {
        if changes.is_empty() {
            return Ok(());
        }
        validate_keys(changes.keys())?;
        let atomicity = self.config.write_atomicity;
        let session = self.session().await?;
        run_blocking(move || session.upsert(&changes, atomicity)).await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys = keys.to_vec();
        let session = self.session().await?;
        run_blocking(move || session.delete(&keys)).await
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs blocking store work on tokio's blocking pool.
async fn run_blocking<T, F>(task: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| StorageError::Store(format!("store task failed: {err}")))?
}

/// Drops a session handle off the async workers.
///
/// The pool closes once the last handle is gone; in-flight operations hold
/// their own handles and finish first.
async fn release(session: Arc<Session>) -> Result<(), StorageError> {
    run_blocking(move || {
        drop(session);
        Ok(())
    })
    .await
}
