// crates/state-store-sql/tests/helpers/mod.rs
// ============================================================================
// Module: Store Test Helpers
// Description: Shared helpers for the SQL store integration suites.
// Purpose: Run one storage contract against every supported backend.
// Dependencies: state-store-sql, serde_json, tokio
// ============================================================================

//! ## Overview
//! Shared helpers for the backend test suites. Each backend suite builds a
//! fresh, persistent [`state_store_sql::StoreConfig`] per test and hands it
//! to the cases in [`contract`].

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod contract;
