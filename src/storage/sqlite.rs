//! `SQLite` storage implementation.

use crate::error::{EngineError, Result};
use crate::model::{Dependency, DependencyType, Note, Priority, Role, RoleTransition, WorkItem};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Distinguishes "field absent" (`None`, leave unchanged) from "field
/// present and explicitly `null`" (`Some(None)`, clear) for the nullable
/// columns in [`WorkItemUpdate`].
fn deserialize_double_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::deserialize(deserializer).map(Some)
}

/// `SQLite`-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Sparse update for `manage_items(update)`. `None` means "leave unchanged";
/// `Some(None)` on the nullable fields means "clear".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkItemUpdate {
    pub title: Option<String>,
    pub summary: Option<String>,
    #[serde(deserialize_with = "deserialize_double_option")]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "deserialize_double_option")]
    pub status_label: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub complexity: Option<u8>,
    pub requires_verification: Option<bool>,
    #[serde(deserialize_with = "deserialize_double_option")]
    pub metadata: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl WorkItemUpdate {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.summary.is_none()
            && self.description.is_none()
            && self.status_label.is_none()
            && self.priority.is_none()
            && self.complexity.is_none()
            && self.requires_verification.is_none()
            && self.metadata.is_none()
            && self.tags.is_none()
    }
}

/// Filters accepted by the search query service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub parent_id: Option<String>,
    pub depth: Option<u8>,
    pub role: Option<Role>,
    pub priority: Option<Priority>,
    pub tags_any_of: Vec<String>,
    pub query: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub modified_after: Option<DateTime<Utc>>,
    pub modified_before: Option<DateTime<Utc>>,
    pub role_changed_after: Option<DateTime<Utc>>,
    pub role_changed_before: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSort {
    Title,
    Priority,
    Complexity,
    CreatedAt,
    ModifiedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

fn row_to_work_item(row: &Row) -> rusqlite::Result<WorkItem> {
    let role_str: String = row.get("role")?;
    let previous_role_str: Option<String> = row.get("previous_role")?;
    let priority_str: String = row.get("priority")?;
    let tags_raw: String = row.get("tags")?;
    let created_at: String = row.get("created_at")?;
    let modified_at: String = row.get("modified_at")?;
    let role_changed_at: String = row.get("role_changed_at")?;

    Ok(WorkItem {
        id: row.get("id")?,
        parent_id: row.get("parent_id")?,
        depth: row.get::<_, i64>("depth")?.try_into().unwrap_or(0),
        title: row.get("title")?,
        summary: row.get("summary")?,
        description: row.get("description")?,
        role: Role::from_str(&role_str).unwrap_or(Role::Queue),
        status_label: row.get("status_label")?,
        previous_role: previous_role_str.and_then(|s| Role::from_str(&s).ok()),
        priority: Priority::from_str(&priority_str).unwrap_or(Priority::Medium),
        complexity: row.get::<_, i64>("complexity")?.try_into().unwrap_or(1),
        requires_verification: row.get::<_, i64>("requires_verification")? != 0,
        metadata: row.get("metadata")?,
        tags: WorkItem::parse_tags_column(&tags_raw),
        created_at: parse_timestamp(&created_at),
        modified_at: parse_timestamp(&modified_at),
        role_changed_at: parse_timestamp(&role_changed_at),
        version: row.get("version")?,
    })
}

fn row_to_dependency(row: &Row) -> rusqlite::Result<Dependency> {
    let dep_type_str: String = row.get("dep_type")?;
    let unblock_at_str: Option<String> = row.get("unblock_at")?;
    Ok(Dependency {
        id: row.get("id")?,
        from_item_id: row.get("from_item_id")?,
        to_item_id: row.get("to_item_id")?,
        dep_type: DependencyType::from_str(&dep_type_str).unwrap_or(DependencyType::RelatesTo),
        unblock_at: unblock_at_str.and_then(|s| Role::from_str(&s).ok()),
    })
}

fn row_to_note(row: &Row) -> rusqlite::Result<Note> {
    let role_str: String = row.get("role")?;
    let created_at: String = row.get("created_at")?;
    let modified_at: String = row.get("modified_at")?;
    Ok(Note {
        id: row.get("id")?,
        item_id: row.get("item_id")?,
        key: row.get("key")?,
        role: Role::from_str(&role_str).unwrap_or(Role::Queue),
        body: row.get("body")?,
        created_at: parse_timestamp(&created_at),
        modified_at: parse_timestamp(&modified_at),
    })
}

fn row_to_transition(row: &Row) -> rusqlite::Result<RoleTransition> {
    let entity_type_str: String = row.get("entity_type")?;
    let from_role_str: String = row.get("from_role")?;
    let to_role_str: String = row.get("to_role")?;
    let trigger_str: String = row.get("trigger")?;
    let transitioned_at: String = row.get("transitioned_at")?;
    Ok(RoleTransition {
        id: row.get("id")?,
        entity_id: row.get("entity_id")?,
        entity_type: entity_type_str.parse().unwrap_or(crate::model::EntityType::Item),
        from_role: Role::from_str(&from_role_str).unwrap_or(Role::Queue),
        to_role: Role::from_str(&to_role_str).unwrap_or(Role::Queue),
        from_status: row.get("from_status")?,
        to_status: row.get("to_status")?,
        transitioned_at: parse_timestamp(&transitioned_at),
        trigger: trigger_str.parse().unwrap_or(crate::model::Trigger::Start),
        summary: row.get("summary")?,
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const WORK_ITEM_COLUMNS: &str = "id, parent_id, depth, title, summary, description, role, \
     status_label, previous_role, priority, complexity, requires_verification, metadata, tags, \
     created_at, modified_at, role_changed_at, version";

impl SqliteStorage {
    /// Open a new connection to the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database, used by tests and by callers with no
    /// durability requirement.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` inside a single serializable transaction. Every compound
    /// operation (`create_work_tree`, `complete_tree`, `advance_item`
    /// batches) goes through this so partial writes never become visible.
    ///
    /// # Errors
    ///
    /// Returns whatever error `f` returns, or a database error from
    /// beginning/committing the transaction. The transaction is rolled
    /// back automatically if `f` errors or panics before completion.
    pub fn with_transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Create a new work item.
    ///
    /// # Errors
    ///
    /// Returns an error if the id already exists or an invariant is violated.
    pub fn create_work_item(&mut self, item: &WorkItem) -> Result<()> {
        self.with_transaction(|tx| insert_work_item(tx, item))
    }

    /// Look up a work item by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_work_item(&self, id: &str) -> Result<Option<WorkItem>> {
        get_work_item(&self.conn, id)
    }

    /// Update an item's mutable fields. Bumps `version`; does not touch
    /// `role`/`previous_role`/`role_changed_at` (that is RSM's job via
    /// [`Self::apply_role_change`]).
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the item doesn't exist, or
    /// `EngineError::Conflict` if `expected_version` is supplied and stale.
    pub fn update_work_item(
        &mut self,
        id: &str,
        updates: &WorkItemUpdate,
        expected_version: Option<i64>,
    ) -> Result<WorkItem> {
        self.with_transaction(|tx| {
            update_work_item_tx(tx, id, updates, expected_version)
        })
    }

    /// Delete a work item, optionally recursing into its subtree.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the item doesn't exist, or
    /// `EngineError::Validation` if it has children and `recursive` is false.
    pub fn delete_work_item(&mut self, id: &str, recursive: bool) -> Result<()> {
        self.with_transaction(|tx| delete_work_item_tx(tx, id, recursive))
    }

    /// List direct children of `parent_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_children(&self, parent_id: &str) -> Result<Vec<WorkItem>> {
        list_children(&self.conn, parent_id)
    }

    /// Count direct children of `parent_id` grouped by role.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_children_by_role(&self, parent_id: &str) -> Result<HashMap<Role, i64>> {
        count_children_by_role(&self.conn, parent_id)
    }

    /// List root items (`parent_id IS NULL`).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_root_items(&self) -> Result<Vec<WorkItem>> {
        find_root_items(&self.conn)
    }

    /// Walk from `id` up to its root, returning `[root, .., item]`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if `id` does not resolve.
    pub fn find_ancestor_chain(&self, id: &str) -> Result<Vec<WorkItem>> {
        find_ancestor_chain(&self.conn, id)
    }

    /// Filtered, paginated search over work items.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_filters(
        &self,
        filters: &SearchFilters,
        sort: SearchSort,
        direction: SortDirection,
    ) -> Result<(Vec<WorkItem>, i64)> {
        find_by_filters(&self.conn, filters, sort, direction)
    }

    /// Apply a role change atomically: updates `role`, conditionally
    /// `previous_role`/`status_label`, bumps `version`, touches
    /// `role_changed_at`, and writes the audit row, all in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` or `EngineError::Conflict`.
    pub fn apply_role_change(
        &mut self,
        id: &str,
        new_role: Role,
        new_previous_role: Option<Role>,
        new_status_label: Option<String>,
        expected_version: i64,
        transition: &RoleTransition,
    ) -> Result<WorkItem> {
        self.with_transaction(|tx| {
            let item = apply_role_change_tx(
                tx,
                id,
                new_role,
                new_previous_role,
                new_status_label,
                expected_version,
            )?;
            record_role_transition(tx, transition)?;
            Ok(item)
        })
    }

    /// Record an audit row directly (used by tests and by compound
    /// operations already inside a transaction).
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record_role_transition(&mut self, transition: &RoleTransition) -> Result<i64> {
        self.with_transaction(|tx| record_role_transition(tx, transition))
    }

    /// List audit rows for an item, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_role_transitions(&self, entity_id: &str) -> Result<Vec<RoleTransition>> {
        list_role_transitions(&self.conn, entity_id)
    }

    /// Insert a dependency edge.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::DuplicateDependency` on a duplicate `(from, to,
    /// type)` triple, or `EngineError::Validation` if the edge itself is
    /// malformed (e.g. matching endpoints).
    pub fn create_dependency(&mut self, dep: &Dependency) -> Result<()> {
        self.with_transaction(|tx| insert_dependency(tx, dep))
    }

    /// Delete a dependency edge by id.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the edge doesn't exist.
    pub fn delete_dependency(&mut self, id: &str) -> Result<()> {
        self.with_transaction(|tx| delete_dependency(tx, id))
    }

    /// All dependency edges touching any of the given item ids (both directions).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_dependencies_for_items(&self, item_ids: &[String]) -> Result<Vec<Dependency>> {
        list_dependencies_for_items(&self.conn, item_ids)
    }

    /// Every dependency edge in the store (used by the in-process graph builder).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_all_dependencies(&self) -> Result<Vec<Dependency>> {
        list_all_dependencies(&self.conn)
    }

    /// Upsert a note, matching on `(item_id, key)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_note(&mut self, item_id: &str, key: &str, role: Role, body: &str) -> Result<Note> {
        self.with_transaction(|tx| upsert_note_tx(tx, item_id, key, role, body))
    }

    /// Delete a note by id.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the note doesn't exist.
    pub fn delete_note(&mut self, id: &str) -> Result<()> {
        self.with_transaction(|tx| delete_note(tx, id))
    }

    /// List notes for an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_notes(&self, item_id: &str) -> Result<Vec<Note>> {
        list_notes(&self.conn, item_id)
    }
}

// --- free functions, usable against both `&Connection` and `&Transaction` ---

pub(crate) fn insert_work_item(conn: &Connection, item: &WorkItem) -> Result<()> {
    item.validate()?;
    conn.execute(
        "INSERT INTO work_items (
            id, parent_id, depth, title, summary, description, role, status_label,
            previous_role, priority, complexity, requires_verification, metadata, tags,
            created_at, modified_at, role_changed_at, version
        ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        rusqlite::params![
            item.id,
            item.parent_id,
            i64::from(item.depth),
            item.title,
            item.summary,
            item.description,
            item.role.as_str(),
            item.status_label,
            item.previous_role.map(Role::as_str),
            item.priority.as_str(),
            i64::from(item.complexity),
            i64::from(item.requires_verification),
            item.metadata,
            item.tags_column(),
            item.created_at.to_rfc3339(),
            item.modified_at.to_rfc3339(),
            item.role_changed_at.to_rfc3339(),
            item.version,
        ],
    )?;
    Ok(())
}

pub(crate) fn get_work_item(conn: &Connection, id: &str) -> Result<Option<WorkItem>> {
    let sql = format!("SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = ?");
    conn.query_row(&sql, [id], row_to_work_item)
        .optional()
        .map_err(EngineError::from)
}

pub(crate) fn require_work_item(conn: &Connection, id: &str) -> Result<WorkItem> {
    get_work_item(conn, id)?.ok_or_else(|| EngineError::not_found("work item", id))
}

#[allow(clippy::too_many_lines)]
pub(crate) fn update_work_item_tx(
    conn: &Connection,
    id: &str,
    updates: &WorkItemUpdate,
    expected_version: Option<i64>,
) -> Result<WorkItem> {
    let existing = require_work_item(conn, id)?;

    if let Some(expected) = expected_version {
        if existing.version != expected {
            return Err(EngineError::Conflict {
                id: id.to_string(),
                expected,
                current: existing.version,
            });
        }
    }

    if updates.is_empty() {
        return Ok(existing);
    }

    let mut set_clauses: Vec<String> = vec!["version = version + 1".into(), "modified_at = ?".into()];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(Utc::now().to_rfc3339())];

    if let Some(ref title) = updates.title {
        if title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be blank".into()));
        }
        set_clauses.push("title = ?".into());
        params.push(Box::new(title.clone()));
    }
    if let Some(ref summary) = updates.summary {
        set_clauses.push("summary = ?".into());
        params.push(Box::new(summary.clone()));
    }
    if let Some(ref description) = updates.description {
        set_clauses.push("description = ?".into());
        params.push(Box::new(description.clone()));
    }
    if let Some(ref status_label) = updates.status_label {
        set_clauses.push("status_label = ?".into());
        params.push(Box::new(status_label.clone()));
    }
    if let Some(priority) = updates.priority {
        set_clauses.push("priority = ?".into());
        params.push(Box::new(priority.as_str()));
    }
    if let Some(complexity) = updates.complexity {
        if !(1..=10).contains(&complexity) {
            return Err(EngineError::Validation(format!(
                "complexity {complexity} out of range [1,10]"
            )));
        }
        set_clauses.push("complexity = ?".into());
        params.push(Box::new(i64::from(complexity)));
    }
    if let Some(requires_verification) = updates.requires_verification {
        set_clauses.push("requires_verification = ?".into());
        params.push(Box::new(i64::from(requires_verification)));
    }
    if let Some(ref metadata) = updates.metadata {
        set_clauses.push("metadata = ?".into());
        params.push(Box::new(metadata.clone()));
    }
    if let Some(ref tags) = updates.tags {
        set_clauses.push("tags = ?".into());
        params.push(Box::new(tags.join(",")));
    }

    let sql = format!(
        "UPDATE work_items SET {} WHERE id = ?",
        set_clauses.join(", ")
    );
    params.push(Box::new(id.to_string()));

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
    conn.execute(&sql, param_refs.as_slice())?;

    require_work_item(conn, id)
}

pub(crate) fn delete_work_item_tx(conn: &Connection, id: &str, recursive: bool) -> Result<()> {
    require_work_item(conn, id)?;
    let children = list_children(conn, id)?;

    if !children.is_empty() {
        if !recursive {
            return Err(EngineError::Validation(format!(
                "item {id} has children; pass recursive=true to delete the subtree"
            )));
        }
        for child in &children {
            delete_work_item_tx(conn, &child.id, true)?;
        }
    }

    conn.execute("DELETE FROM work_items WHERE id = ?", [id])?;
    Ok(())
}

pub(crate) fn list_children(conn: &Connection, parent_id: &str) -> Result<Vec<WorkItem>> {
    let sql = format!(
        "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE parent_id = ? ORDER BY created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([parent_id], row_to_work_item)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn count_children_by_role(conn: &Connection, parent_id: &str) -> Result<HashMap<Role, i64>> {
    let mut stmt = conn.prepare(
        "SELECT role, COUNT(*) FROM work_items WHERE parent_id = ? GROUP BY role",
    )?;
    let mut out = HashMap::new();
    let rows = stmt.query_map([parent_id], |row| {
        let role_str: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((role_str, count))
    })?;
    for row in rows {
        let (role_str, count) = row?;
        if let Ok(role) = Role::from_str(&role_str) {
            out.insert(role, count);
        }
    }
    Ok(out)
}

pub(crate) fn find_root_items(conn: &Connection) -> Result<Vec<WorkItem>> {
    let sql = format!(
        "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE parent_id IS NULL ORDER BY created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_work_item)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn find_ancestor_chain(conn: &Connection, id: &str) -> Result<Vec<WorkItem>> {
    let mut chain = vec![require_work_item(conn, id)?];
    while let Some(parent_id) = chain[0].parent_id.clone() {
        let parent = require_work_item(conn, &parent_id)?;
        chain.insert(0, parent);
    }
    Ok(chain)
}

#[allow(clippy::too_many_lines)]
pub(crate) fn find_by_filters(
    conn: &Connection,
    filters: &SearchFilters,
    sort: SearchSort,
    direction: SortDirection,
) -> Result<(Vec<WorkItem>, i64)> {
    let mut clauses: Vec<String> = vec![];
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

    if let Some(ref parent_id) = filters.parent_id {
        clauses.push("parent_id = ?".into());
        params.push(Box::new(parent_id.clone()));
    }
    if let Some(depth) = filters.depth {
        clauses.push("depth = ?".into());
        params.push(Box::new(i64::from(depth)));
    }
    if let Some(role) = filters.role {
        clauses.push("role = ?".into());
        params.push(Box::new(role.as_str()));
    }
    if let Some(priority) = filters.priority {
        clauses.push("priority = ?".into());
        params.push(Box::new(priority.as_str()));
    }
    if !filters.tags_any_of.is_empty() {
        let tag_clauses: Vec<String> = filters
            .tags_any_of
            .iter()
            .map(|tag| {
                params.push(Box::new(format!("%{tag}%")));
                "(',' || tags || ',') LIKE ?".to_string()
            })
            .collect();
        clauses.push(format!("({})", tag_clauses.join(" OR ")));
    }
    if let Some(ref query) = filters.query {
        clauses.push("(title LIKE ? OR summary LIKE ?)".into());
        let pattern = format!("%{query}%");
        params.push(Box::new(pattern.clone()));
        params.push(Box::new(pattern));
    }
    if let Some(after) = filters.created_after {
        clauses.push("created_at >= ?".into());
        params.push(Box::new(after.to_rfc3339()));
    }
    if let Some(before) = filters.created_before {
        clauses.push("created_at <= ?".into());
        params.push(Box::new(before.to_rfc3339()));
    }
    if let Some(after) = filters.modified_after {
        clauses.push("modified_at >= ?".into());
        params.push(Box::new(after.to_rfc3339()));
    }
    if let Some(before) = filters.modified_before {
        clauses.push("modified_at <= ?".into());
        params.push(Box::new(before.to_rfc3339()));
    }
    if let Some(after) = filters.role_changed_after {
        clauses.push("role_changed_at >= ?".into());
        params.push(Box::new(after.to_rfc3339()));
    }
    if let Some(before) = filters.role_changed_before {
        clauses.push("role_changed_at <= ?".into());
        params.push(Box::new(before.to_rfc3339()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM work_items {where_clause}");
    let count_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
    let total: i64 = conn.query_row(&count_sql, count_refs.as_slice(), |row| row.get(0))?;

    let sort_col = match sort {
        SearchSort::Title => "title",
        SearchSort::Priority => "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 WHEN 'high' THEN 2 END",
        SearchSort::Complexity => "complexity",
        SearchSort::CreatedAt => "created_at",
        SearchSort::ModifiedAt => "modified_at",
    };
    let dir = match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };

    let sql = format!(
        "SELECT {WORK_ITEM_COLUMNS} FROM work_items {where_clause} ORDER BY {sort_col} {dir}, id ASC LIMIT ? OFFSET ?"
    );
    params.push(Box::new(filters.limit));
    params.push(Box::new(filters.offset));
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(param_refs.as_slice(), row_to_work_item)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok((rows, total))
}

pub(crate) fn apply_role_change_tx(
    conn: &Connection,
    id: &str,
    new_role: Role,
    new_previous_role: Option<Role>,
    new_status_label: Option<String>,
    expected_version: i64,
) -> Result<WorkItem> {
    let existing = require_work_item(conn, id)?;
    if existing.version != expected_version {
        return Err(EngineError::Conflict {
            id: id.to_string(),
            expected: expected_version,
            current: existing.version,
        });
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE work_items SET role = ?, previous_role = ?, status_label = ?, \
         role_changed_at = ?, modified_at = ?, version = version + 1 WHERE id = ?",
        rusqlite::params![
            new_role.as_str(),
            new_previous_role.map(Role::as_str),
            new_status_label,
            now,
            now,
            id,
        ],
    )?;

    require_work_item(conn, id)
}

pub(crate) fn record_role_transition(conn: &Connection, transition: &RoleTransition) -> Result<i64> {
    conn.execute(
        "INSERT INTO role_transitions (
            entity_id, entity_type, from_role, to_role, from_status, to_status,
            transitioned_at, trigger, summary
        ) VALUES (?,?,?,?,?,?,?,?,?)",
        rusqlite::params![
            transition.entity_id,
            transition.entity_type.as_str(),
            transition.from_role.as_str(),
            transition.to_role.as_str(),
            transition.from_status,
            transition.to_status,
            transition.transitioned_at.to_rfc3339(),
            transition.trigger.as_str(),
            transition.summary,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn list_role_transitions(conn: &Connection, entity_id: &str) -> Result<Vec<RoleTransition>> {
    let mut stmt = conn.prepare(
        "SELECT id, entity_id, entity_type, from_role, to_role, from_status, to_status, \
         transitioned_at, trigger, summary FROM role_transitions WHERE entity_id = ? \
         ORDER BY transitioned_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([entity_id], row_to_transition)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn insert_dependency(conn: &Connection, dep: &Dependency) -> Result<()> {
    dep.validate()?;
    let exists: bool = conn
        .query_row(
            "SELECT 1 FROM dependencies WHERE from_item_id = ? AND to_item_id = ? AND dep_type = ?",
            rusqlite::params![dep.from_item_id, dep.to_item_id, dep.dep_type.as_str()],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        return Err(EngineError::DuplicateDependency {
            from: dep.from_item_id.clone(),
            to: dep.to_item_id.clone(),
            dep_type: dep.dep_type.to_string(),
        });
    }

    conn.execute(
        "INSERT INTO dependencies (id, from_item_id, to_item_id, dep_type, unblock_at) \
         VALUES (?,?,?,?,?)",
        rusqlite::params![
            dep.id,
            dep.from_item_id,
            dep.to_item_id,
            dep.dep_type.as_str(),
            dep.unblock_at.map(Role::as_str),
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_dependency(conn: &Connection, id: &str) -> Result<()> {
    let affected = conn.execute("DELETE FROM dependencies WHERE id = ?", [id])?;
    if affected == 0 {
        return Err(EngineError::not_found("dependency", id));
    }
    Ok(())
}

pub(crate) fn list_dependencies_for_items(conn: &Connection, item_ids: &[String]) -> Result<Vec<Dependency>> {
    if item_ids.is_empty() {
        return Ok(vec![]);
    }
    let placeholders = item_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT id, from_item_id, to_item_id, dep_type, unblock_at FROM dependencies \
         WHERE from_item_id IN ({placeholders}) OR to_item_id IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = item_ids
        .iter()
        .chain(item_ids.iter())
        .map(|s| s as &dyn rusqlite::ToSql)
        .collect();
    let rows = stmt
        .query_map(params.as_slice(), row_to_dependency)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn list_all_dependencies(conn: &Connection) -> Result<Vec<Dependency>> {
    let mut stmt =
        conn.prepare("SELECT id, from_item_id, to_item_id, dep_type, unblock_at FROM dependencies")?;
    let rows = stmt
        .query_map([], row_to_dependency)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn upsert_note_tx(conn: &Connection, item_id: &str, key: &str, role: Role, body: &str) -> Result<Note> {
    require_work_item(conn, item_id)?;
    let now = Utc::now();
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM notes WHERE item_id = ? AND key = ?",
            rusqlite::params![item_id, key],
            |row| row.get(0),
        )
        .optional()?;

    let id = if let Some(id) = existing {
        conn.execute(
            "UPDATE notes SET role = ?, body = ?, modified_at = ? WHERE id = ?",
            rusqlite::params![role.as_str(), body, now.to_rfc3339(), id],
        )?;
        id
    } else {
        let id = crate::util::id::derive_id("note", &format!("{item_id}:{key}"), now);
        conn.execute(
            "INSERT INTO notes (id, item_id, key, role, body, created_at, modified_at) \
             VALUES (?,?,?,?,?,?,?)",
            rusqlite::params![
                id,
                item_id,
                key,
                role.as_str(),
                body,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        id
    };

    conn.query_row(
        "SELECT id, item_id, key, role, body, created_at, modified_at FROM notes WHERE id = ?",
        [&id],
        row_to_note,
    )
    .map_err(EngineError::from)
}

pub(crate) fn delete_note(conn: &Connection, id: &str) -> Result<()> {
    let affected = conn.execute("DELETE FROM notes WHERE id = ?", [id])?;
    if affected == 0 {
        return Err(EngineError::not_found("note", id));
    }
    Ok(())
}

pub(crate) fn list_notes(conn: &Connection, item_id: &str) -> Result<Vec<Note>> {
    let mut stmt = conn.prepare(
        "SELECT id, item_id, key, role, body, created_at, modified_at FROM notes \
         WHERE item_id = ? ORDER BY key ASC",
    )?;
    let rows = stmt
        .query_map([item_id], row_to_note)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

use crate::storage::schema;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityType;

    fn sample_item(id: &str, parent_id: Option<&str>, depth: u8, role: Role) -> WorkItem {
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

    #[test]
    fn create_and_get_round_trip() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let item = sample_item("wi-1", None, 0, Role::Queue);
        store.create_work_item(&item).unwrap();
        let fetched = store.get_work_item("wi-1").unwrap().unwrap();
        assert_eq!(fetched.title, item.title);
        assert_eq!(fetched.depth, 0);
        assert_eq!(fetched.version, 1);
    }

    #[test]
    fn update_bumps_version_and_conflicts_on_stale() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store
            .create_work_item(&sample_item("wi-1", None, 0, Role::Queue))
            .unwrap();

        let updates = WorkItemUpdate {
            summary: Some("updated".into()),
            ..Default::default()
        };
        let updated = store.update_work_item("wi-1", &updates, Some(1)).unwrap();
        assert_eq!(updated.version, 2);

        let err = store
            .update_work_item("wi-1", &updates, Some(1))
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { current: 2, .. }));
    }

    #[test]
    fn delete_requires_recursive_for_nonleaf() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store
            .create_work_item(&sample_item("root", None, 0, Role::Queue))
            .unwrap();
        store
            .create_work_item(&sample_item("child", Some("root"), 1, Role::Queue))
            .unwrap();

        assert!(store.delete_work_item("root", false).is_err());
        store.delete_work_item("root", true).unwrap();
        assert!(store.get_work_item("root").unwrap().is_none());
        assert!(store.get_work_item("child").unwrap().is_none());
    }

    #[test]
    fn dependency_rejects_duplicate() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store
            .create_work_item(&sample_item("a", None, 0, Role::Queue))
            .unwrap();
        store
            .create_work_item(&sample_item("b", None, 0, Role::Queue))
            .unwrap();

        let dep = Dependency {
            id: "dep-1".into(),
            from_item_id: "a".into(),
            to_item_id: "b".into(),
            dep_type: DependencyType::Blocks,
            unblock_at: None,
        };
        store.create_dependency(&dep).unwrap();
        let mut dup = dep.clone();
        dup.id = "dep-2".into();
        assert!(store.create_dependency(&dup).is_err());
    }

    #[test]
    fn note_upsert_matches_on_item_and_key() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store
            .create_work_item(&sample_item("a", None, 0, Role::Queue))
            .unwrap();
        let first = store.upsert_note("a", "root-cause", Role::Work, "").unwrap();
        assert!(!first.is_filled());
        let second = store
            .upsert_note("a", "root-cause", Role::Work, "because X")
            .unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.is_filled());
        assert_eq!(store.list_notes("a").unwrap().len(), 1);
    }

    #[test]
    fn role_change_records_audit_row() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store
            .create_work_item(&sample_item("a", None, 0, Role::Queue))
            .unwrap();
        let transition = RoleTransition {
            id: 0,
            entity_id: "a".into(),
            entity_type: EntityType::Item,
            from_role: Role::Queue,
            to_role: Role::Work,
            from_status: None,
            to_status: None,
            transitioned_at: Utc::now(),
            trigger: crate::model::Trigger::Start,
            summary: None,
        };
        let updated = store
            .apply_role_change("a", Role::Work, Some(Role::Queue), None, 1, &transition)
            .unwrap();
        assert_eq!(updated.role, Role::Work);
        assert_eq!(updated.version, 2);
        let rows = store.list_role_transitions("a").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].to_role, Role::Work);
    }
}
