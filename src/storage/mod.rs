//! `SQLite` storage layer for the work-item engine.
//!
//! Provides the persistence layer using `SQLite` with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes: every compound operation
//!   declares its own transaction boundary via
//!   [`sqlite::SqliteStorage::with_transaction`]
//! - Optimistic concurrency on `work_items.version`
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main `SQLite` storage implementation

pub mod schema;
pub mod sqlite;

pub use sqlite::{SearchFilters, SearchSort, SortDirection, SqliteStorage, WorkItemUpdate};
