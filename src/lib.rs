//! `workitem_engine` - hierarchical work-item orchestration engine.
//!
//! This crate provides the core engine behind the `wie` binary: a
//! `SQLite`-backed store of hierarchical work items, a fixed role state
//! machine governing their lifecycle, and a tool-call oriented surface
//! ([`tools`]) that a transport adapter (stdio, HTTP, ...) dispatches
//! into. The transport framing itself lives outside this crate.
//!
//! # Architecture
//!
//! - [`model`] - domain types (`WorkItem`, `Dependency`, `Note`, `Role`, `Trigger`)
//! - [`storage`] - `SQLite` persistence layer
//! - [`rsm`] - the role state machine: legal transitions and cascade rules
//! - [`gate`] - note-completeness gate evaluation ahead of a role transition
//! - [`depgraph`] - dependency graph: cycle checks, blocked/unblock queries
//! - [`workflow`] - `advance_item`/`advance_items_batch`, the engine's single write path for role changes
//! - [`compound`] - multi-item operations (`create_work_tree`, `complete_tree`)
//! - [`query`] - read-side services (search, overview, next item, blocked items, context)
//! - [`notes`] - note CRUD
//! - [`tools`] - the external tool surface and its response envelope
//! - [`config`] - configuration management
//! - [`error`] - error types and handling
//! - [`util`] - utility functions (id derivation)

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod compound;
pub mod config;
pub mod depgraph;
pub mod error;
pub mod gate;
pub mod logging;
pub mod model;
pub mod notes;
pub mod query;
pub mod rsm;
pub mod storage;
pub mod tools;
pub mod util;
pub mod workflow;

pub use error::{EngineError, ErrorCode, Result};
