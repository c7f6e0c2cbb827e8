//! Shared fixtures for integration tests: scratch stores and ad-hoc schemas.

#![allow(dead_code)]

use chrono::Utc;
use std::sync::Once;
use workitem_engine::model::{DependencyType, Priority, Role, WorkItem};
use workitem_engine::storage::SqliteStorage;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        workitem_engine::logging::init_test_logging();
    });
}

/// An in-memory store, schema-applied and ready to use.
pub fn test_db() -> SqliteStorage {
    init_test_logging();
    SqliteStorage::open_memory().expect("open in-memory store")
}

/// A file-backed store under a fresh temp directory, for tests that exercise
/// `SqliteStorage::open` (path handling, reopen-after-close) rather than the
/// in-memory fast path.
pub fn test_db_with_dir() -> (SqliteStorage, tempfile::TempDir) {
    init_test_logging();
    let dir = tempfile::tempdir().expect("create temp dir");
    let db_path = dir.path().join("workitems.db");
    let store = SqliteStorage::open(&db_path).expect("open file-backed store");
    (store, dir)
}

/// An empty note schema - no tag carries any expected notes.
pub fn empty_schema() -> workitem_engine::config::NoteSchema {
    serde_yaml::from_str("{}").expect("parse empty schema")
}

/// A schema with a single required note for items tagged `tag`, gating entry
/// into `role`.
pub fn schema_requiring(tag: &str, key: &str, role: Role) -> workitem_engine::config::NoteSchema {
    let yaml = format!("{tag}:\n  - key: {key}\n    role: {}\n    required: true\n", role.as_str());
    serde_yaml::from_str(&yaml).expect("parse schema fixture")
}

pub mod fixtures {
    use super::{DependencyType, Priority, Role, Utc, WorkItem};
    use workitem_engine::model::Dependency;

    /// A minimal, valid `WorkItem` with caller-chosen id/parent/depth/role;
    /// every other field takes a reasonable default.
    pub fn work_item(id: &str, parent_id: Option<&str>, depth: u8, role: Role) -> WorkItem {
        let now = Utc::now();
        WorkItem {
            id: id.to_string(),
            parent_id: parent_id.map(ToString::to_string),
            depth,
            title: format!("Item {id}"),
            summary: String::new(),
            description: None,
            role,
            status_label: None,
            previous_role: None,
            priority: Priority::Medium,
            complexity: 1,
            requires_verification: false,
            metadata: None,
            tags: vec![],
            created_at: now,
            modified_at: now,
            role_changed_at: now,
            version: 1,
        }
    }

    pub fn tagged_work_item(id: &str, role: Role, tags: &[&str]) -> WorkItem {
        let mut item = work_item(id, None, 0, role);
        item.tags = tags.iter().map(ToString::to_string).collect();
        item
    }

    /// A `BLOCKS` edge from `from` to `to`, satisfied once the blocker
    /// reaches `unblock_at`.
    pub fn blocks(id: &str, from: &str, to: &str, unblock_at: Role) -> Dependency {
        Dependency {
            id: id.to_string(),
            from_item_id: from.to_string(),
            to_item_id: to.to_string(),
            dep_type: DependencyType::Blocks,
            unblock_at: Some(unblock_at),
        }
    }
}
