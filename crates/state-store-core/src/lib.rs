// crates/state-store-core/src/lib.rs
// ============================================================================
// Module: State Store Core Library
// Description: Public API surface for the key-value storage contract.
// Purpose: Expose the storage interface, error taxonomy, and reference store.
// Dependencies: crate::{interfaces, memory}
// ============================================================================

//! ## Overview
//! State store core defines the contract a state-management layer uses to
//! persist JSON records under string keys: batch `read`, upserting `write`,
//! and idempotent `delete`. Backends (relational, in-memory) implement the
//! [`Storage`] trait and are interchangeable behind [`SharedStorage`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod interfaces;
pub mod memory;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use interfaces::MAX_KEY_LENGTH;
pub use interfaces::SharedStorage;
pub use interfaces::Storage;
pub use interfaces::StorageError;
pub use interfaces::StoreItems;
pub use interfaces::is_storable_key;
pub use interfaces::validate_keys;
pub use memory::InMemoryStorage;
