//! Notes service: upsert and delete, matching on `(itemId, key)`.

use crate::error::Result;
use crate::model::{Note, Role};
use crate::storage::sqlite::SqliteStorage;

/// Upsert a note on an item. Creates with `createdAt = modifiedAt = now` if
/// no row exists for `(item_id, key)`; otherwise overwrites `body`, `role`,
/// and `modifiedAt`.
///
/// # Errors
///
/// Returns `EngineError::NotFound` if `item_id` doesn't resolve.
pub fn upsert(store: &mut SqliteStorage, item_id: &str, key: &str, role: Role, body: &str) -> Result<Note> {
    store.upsert_note(item_id, key, role, body)
}

/// Delete a note by id.
///
/// # Errors
///
/// Returns `EngineError::NotFound` if the note doesn't exist.
pub fn delete(store: &mut SqliteStorage, id: &str) -> Result<()> {
    store.delete_note(id)
}

/// List notes for an item. `include_body` controls whether the full text is
/// fetched or a metadata-only projection is returned — the list call
/// itself is always full; this just clears `body` on the returned values
/// when the caller asked for metadata only.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(store: &SqliteStorage, item_id: &str, include_body: bool) -> Result<Vec<Note>> {
    let notes = store.list_notes(item_id)?;
    if include_body {
        return Ok(notes);
    }
    Ok(notes
        .into_iter()
        .map(|mut note| {
            note.body.clear();
            note
        })
        .collect())
}

/// List notes for an item filtered by role and/or key.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_filtered(
    store: &SqliteStorage,
    item_id: &str,
    role: Option<Role>,
    key: Option<&str>,
) -> Result<Vec<Note>> {
    let notes = store.list_notes(item_id)?;
    Ok(notes
        .into_iter()
        .filter(|n| role.is_none_or(|r| n.role == r))
        .filter(|n| key.is_none_or(|k| n.key == k))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_list_round_trips() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store
            .create_work_item(&crate::model::WorkItem {
                id: "a".into(),
                parent_id: None,
                depth: 0,
                title: "A".into(),
                summary: String::new(),
                description: None,
                role: crate::model::Role::Queue,
                status_label: None,
                previous_role: None,
                priority: crate::model::Priority::Medium,
                complexity: 1,
                requires_verification: false,
                metadata: None,
                tags: vec![],
                created_at: chrono::Utc::now(),
                modified_at: chrono::Utc::now(),
                role_changed_at: chrono::Utc::now(),
                version: 1,
            })
            .unwrap();

        upsert(&mut store, "a", "root-cause", Role::Work, "disk full").unwrap();
        let notes = list(&store, "a", true).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].body, "disk full");

        let metadata_only = list(&store, "a", false).unwrap();
        assert!(metadata_only[0].body.is_empty());
    }

    #[test]
    fn list_filtered_by_role() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store
            .create_work_item(&crate::model::WorkItem {
                id: "a".into(),
                parent_id: None,
                depth: 0,
                title: "A".into(),
                summary: String::new(),
                description: None,
                role: crate::model::Role::Queue,
                status_label: None,
                previous_role: None,
                priority: crate::model::Priority::Medium,
                complexity: 1,
                requires_verification: false,
                metadata: None,
                tags: vec![],
                created_at: chrono::Utc::now(),
                modified_at: chrono::Utc::now(),
                role_changed_at: chrono::Utc::now(),
                version: 1,
            })
            .unwrap();
        upsert(&mut store, "a", "root-cause", Role::Work, "x").unwrap();
        upsert(&mut store, "a", "verified", Role::Review, "y").unwrap();

        let work_notes = list_filtered(&store, "a", Some(Role::Work), None).unwrap();
        assert_eq!(work_notes.len(), 1);
        assert_eq!(work_notes[0].key, "root-cause");
    }
}
