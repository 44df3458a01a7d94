// crates/vpt-store-sqlite/src/lib.rs
// ============================================================================
// Crate: vpt-store-sqlite
// Description: SQLite-backed TreeSource and ExecutionRecorder implementation.
// Purpose: Durable storage for navigation trees and execution history (§6).
// ============================================================================

//! ## Overview
//! [`store`] implements [`vpt_core::TreeSource`] and
//! [`vpt_core::ExecutionRecorder`] over a single `SQLite` database file. It
//! is the reference durable backend for the engine; host applications may
//! substitute another backend satisfying the same two traits.

pub mod store;

pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreMode;
