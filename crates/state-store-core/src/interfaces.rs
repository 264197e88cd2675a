// crates/state-store-core/src/interfaces.rs
// ============================================================================
// Module: State Store Interfaces
// Description: Backend-agnostic key-value storage contract.
// Purpose: Define the read/write/delete surface consumed by state managers.
// Dependencies: async-trait, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The storage contract is small. Keys are strings, values are
//! arbitrary JSON, and every operation works on a batch:
//! - `read` returns only the keys that exist; missing keys are not errors.
//! - `write` upserts every entry with last-write-wins semantics.
//! - `delete` removes every listed key and ignores keys that do not exist.
//!
//! Empty batches are no-ops and must not touch the backing store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Maximum key length in characters accepted by stores.
pub const MAX_KEY_LENGTH: usize = 500;

/// Key to JSON value mapping exchanged with stores.
///
/// Iteration follows insertion order, so a `write` applies entries in the
/// order the caller inserted them.
pub type StoreItems = Map<String, Value>;

/// Storage errors surfaced by every store backend.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed stored payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The store could not establish or use a session (connect failure,
    /// authentication failure, pool exhaustion, acquire timeout).
    #[error("storage connection error: {0}")]
    Connection(String),
    /// A statement against the backing store failed.
    #[error("storage query error: {0}")]
    Query(String),
    /// Caller input was rejected before reaching the backing store.
    #[error("storage invalid input: {0}")]
    Invalid(String),
    /// A stored payload could not be decoded.
    #[error("storage corruption: {0}")]
    Corrupt(String),
    /// Internal store failure unrelated to the backing store.
    #[error("storage error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Storage Trait
// ============================================================================

/// Key-value storage contract.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reads the values stored under `keys`.
    ///
    /// Keys without a stored value are omitted from the result.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing store cannot be queried.
    async fn read(&self, keys: &[String]) -> Result<StoreItems, StorageError>;

    /// Upserts every entry in `changes`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when an entry is rejected or a write fails.
    async fn write(&self, changes: StoreItems) -> Result<(), StorageError>;

    /// Deletes every key in `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing store cannot be updated.
    async fn delete(&self, keys: &[String]) -> Result<(), StorageError>;
}

/// Shared storage backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedStorage {
    /// Inner storage implementation.
    inner: Arc<dyn Storage>,
}

impl SharedStorage {
    /// Wraps a storage implementation in a shared, clonable wrapper.
    #[must_use]
    pub fn from_storage(storage: impl Storage + 'static) -> Self {
        Self {
            inner: Arc::new(storage),
        }
    }

    /// Wraps an existing shared storage.
    #[must_use]
    pub const fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: storage,
        }
    }
}

#[async_trait]
impl Storage for SharedStorage {
    async fn read(&self, keys: &[String]) -> Result<StoreItems, StorageError> {
        self.inner.read(keys).await
    }

    async fn write(&self, changes: StoreItems) -> Result<(), StorageError> {
        self.inner.write(changes).await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        self.inner.delete(keys).await
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Checks that every key fits the persisted key column.
///
/// Text columns cannot hold NUL, so keys containing `\0` are rejected along
/// with keys longer than [`MAX_KEY_LENGTH`] characters.
///
/// # Errors
///
/// Returns [`StorageError::Invalid`] for the first key that cannot be stored.
/// The message names the failing property, never the key itself.
pub fn validate_keys<'a>(keys: impl IntoIterator<Item = &'a String>) -> Result<(), StorageError> {
    for key in keys {
        if !is_storable_key(key) {
            let length = key.chars().count();
            if length > MAX_KEY_LENGTH {
                return Err(StorageError::Invalid(format!(
                    "key exceeds length limit: {length} characters (max {MAX_KEY_LENGTH})"
                )));
            }
            return Err(StorageError::Invalid("key contains a NUL character".to_string()));
        }
    }
    Ok(())
}

/// Returns true when `key` can be persisted: no NUL and within the length limit.
#[must_use]
pub fn is_storable_key(key: &str) -> bool {
    !key.contains('\0') && key.chars().count() <= MAX_KEY_LENGTH
}
