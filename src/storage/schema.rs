//! Database schema definitions and idempotent migration logic.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the work-item database.
pub const SCHEMA_SQL: &str = r"
    -- Work items: the hierarchical tree (root/child/grandchild, depth 0..2).
    CREATE TABLE IF NOT EXISTS work_items (
        id TEXT PRIMARY KEY,
        parent_id TEXT,
        depth INTEGER NOT NULL CHECK(depth BETWEEN 0 AND 2),
        title TEXT NOT NULL CHECK(length(trim(title)) > 0),
        summary TEXT NOT NULL DEFAULT '',
        description TEXT,
        role TEXT NOT NULL CHECK(role IN ('queue','work','review','blocked','terminal')),
        status_label TEXT,
        previous_role TEXT,
        priority TEXT NOT NULL DEFAULT 'medium' CHECK(priority IN ('high','medium','low')),
        complexity INTEGER NOT NULL DEFAULT 1 CHECK(complexity BETWEEN 1 AND 10),
        requires_verification INTEGER NOT NULL DEFAULT 0,
        metadata TEXT,
        tags TEXT NOT NULL DEFAULT '',
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        modified_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        role_changed_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        version INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY (parent_id) REFERENCES work_items(id)
    );
    CREATE INDEX IF NOT EXISTS idx_work_items_parent ON work_items(parent_id);
    CREATE INDEX IF NOT EXISTS idx_work_items_role ON work_items(role);
    CREATE INDEX IF NOT EXISTS idx_work_items_priority ON work_items(priority);
    CREATE INDEX IF NOT EXISTS idx_work_items_created_at ON work_items(created_at);
    CREATE INDEX IF NOT EXISTS idx_work_items_modified_at ON work_items(modified_at);
    CREATE INDEX IF NOT EXISTS idx_work_items_role_changed_at ON work_items(role_changed_at);
    -- Composite for next-actionable queries: open roles only.
    CREATE INDEX IF NOT EXISTS idx_work_items_actionable
        ON work_items(role, priority, created_at)
        WHERE role NOT IN ('blocked', 'terminal');

    -- Dependencies: typed directed edges between work items.
    CREATE TABLE IF NOT EXISTS dependencies (
        id TEXT PRIMARY KEY,
        from_item_id TEXT NOT NULL,
        to_item_id TEXT NOT NULL,
        dep_type TEXT NOT NULL CHECK(dep_type IN ('BLOCKS','IS_BLOCKED_BY','RELATES_TO')),
        unblock_at TEXT CHECK(unblock_at IN ('queue','work','review','terminal') OR unblock_at IS NULL),
        UNIQUE(from_item_id, to_item_id, dep_type),
        FOREIGN KEY (from_item_id) REFERENCES work_items(id) ON DELETE CASCADE,
        FOREIGN KEY (to_item_id) REFERENCES work_items(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_dependencies_from ON dependencies(from_item_id);
    CREATE INDEX IF NOT EXISTS idx_dependencies_to ON dependencies(to_item_id);
    CREATE INDEX IF NOT EXISTS idx_dependencies_type ON dependencies(dep_type);

    -- Notes: structured text attachments keyed by schema name.
    CREATE TABLE IF NOT EXISTS notes (
        id TEXT PRIMARY KEY,
        item_id TEXT NOT NULL,
        key TEXT NOT NULL,
        role TEXT NOT NULL CHECK(role IN ('queue','work','review','terminal')),
        body TEXT NOT NULL DEFAULT '',
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        modified_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(item_id, key),
        FOREIGN KEY (item_id) REFERENCES work_items(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_notes_item ON notes(item_id);
    CREATE INDEX IF NOT EXISTS idx_notes_role ON notes(role);

    -- Role transitions: append-only audit trail.
    CREATE TABLE IF NOT EXISTS role_transitions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_id TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        from_role TEXT NOT NULL,
        to_role TEXT NOT NULL,
        from_status TEXT,
        to_status TEXT,
        transitioned_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        trigger TEXT NOT NULL,
        summary TEXT,
        FOREIGN KEY (entity_id) REFERENCES work_items(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_role_transitions_entity ON role_transitions(entity_id);
    CREATE INDEX IF NOT EXISTS idx_role_transitions_transitioned_at ON role_transitions(transitioned_at);
";

/// Apply the schema to the database. Idempotent: every statement uses
/// `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // WAL for concurrent readers while a writer holds the transaction.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", "-8000")?;
    conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        for expected in ["work_items", "dependencies", "notes", "role_transitions"] {
            assert!(tables.contains(&expected.to_string()), "missing {expected}");
        }

        let foreign_keys: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn rejects_blank_title() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO work_items (id, depth, title, role) VALUES ('x', 0, '   ', 'queue')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_depth_over_two() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        let result = conn.execute(
            "INSERT INTO work_items (id, depth, title, role) VALUES ('x', 3, 'T', 'queue')",
            [],
        );
        assert!(result.is_err());
    }
}
