// crates/state-store-core/src/memory.rs
// ============================================================================
// Module: In-Memory Storage
// Description: Simple in-memory key-value storage for tests and examples.
// Purpose: Provide the storage contract without an external backing store.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryStorage`] keeps every record in a mutex-guarded map. It follows
//! the same contract as the relational store and is intended for tests and
//! local demos only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::interfaces::Storage;
use crate::interfaces::StorageError;
use crate::interfaces::StoreItems;
use crate::interfaces::validate_keys;

// ============================================================================
// SECTION: In-Memory Storage
// ============================================================================

/// In-memory storage for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    /// Stored records protected by a mutex.
    records: Arc<Mutex<StoreItems>>,
}

impl InMemoryStorage {
    /// Creates an empty in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Store`] when the mutex is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.len())
    }

    /// Returns true when no records are stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Store`] when the mutex is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.lock()?.is_empty())
    }

    /// Locks the record map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreItems>, StorageError> {
        self.records
            .lock()
            .map_err(|_| StorageError::Store("in-memory storage mutex poisoned".to_string()))
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn read(&self, keys: &[String]) -> Result<StoreItems, StorageError> {
        if keys.is_empty() {
            return Ok(StoreItems::new());
        }
        let guard = self.lock()?;
        let mut items = StoreItems::new();
        for key in keys {
            if let Some(value) = guard.get(key) {
                items.insert(key.clone(), value.clone());
            }
        }
        drop(guard);
        Ok(items)
    }

    async fn write(&self, changes: StoreItems) -> Result<(), StorageError> {
        if changes.is_empty() {
            return Ok(());
        }
        validate_keys(changes.keys())?;
        let mut guard = self.lock()?;
        for (key, value) in changes {
            guard.insert(key, value);
        }
        drop(guard);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut guard = self.lock()?;
        for key in keys {
            guard.shift_remove(key);
        }
        drop(guard);
        Ok(())
    }
}
