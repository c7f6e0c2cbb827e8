//! Compound Operations: `create_work_tree` and `complete_tree`, the atomic
//! multi-item mutations that build or retire a whole subtree in one
//! transaction.

use crate::config::NoteSchema;
use crate::depgraph;
use crate::error::{EngineError, Result};
use crate::model::{Dependency, DependencyType, Note, Priority, Role, Trigger, WorkItem};
use crate::storage::sqlite::{self, SqliteStorage};
use crate::util::id::IdSequence;
use crate::workflow::{self, AdvanceRequest};
use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// Caller-supplied fields for one item in a new tree. `title` is the only
/// field without a sensible default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TreeItemSpec {
    pub title: String,
    pub summary: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub complexity: Option<u8>,
    pub requires_verification: bool,
    pub metadata: Option<String>,
    pub tags: Vec<String>,
    pub status_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChildSpec {
    #[serde(rename = "ref")]
    pub item_ref: String,
    #[serde(flatten)]
    pub spec: TreeItemSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepSpec {
    pub from_ref: String,
    pub to_ref: String,
    pub dep_type: DependencyType,
    #[serde(default)]
    pub unblock_at: Option<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkTreeRequest {
    pub root: TreeItemSpec,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<ChildSpec>,
    #[serde(default)]
    pub deps: Vec<DepSpec>,
    #[serde(default)]
    pub create_notes: bool,
}

/// A note produced by `createNotes`, tagged by the local `ref` of the item
/// it was created for (`"root"` or a child ref).
#[derive(Debug, Clone)]
pub struct TaggedNote {
    pub item_ref: String,
    pub note: Note,
}

#[derive(Debug, Clone)]
pub struct CreateWorkTreeResult {
    pub root: WorkItem,
    pub children: Vec<WorkItem>,
    pub dependencies: Vec<Dependency>,
    pub notes: Vec<TaggedNote>,
}

const ROOT_REF: &str = "root";

/// Atomically materialize a root item, its children, typed dependencies
/// between them, and (optionally) blank schema notes.
///
/// # Errors
///
/// `EngineError::Validation` on depth overflow, duplicate/root-shadowing
/// refs, unresolved dep refs, or an in-batch dependency cycle.
/// `EngineError::NotFound` if `parent_id` is supplied but unknown.
pub fn create_work_tree(
    store: &mut SqliteStorage,
    schema: &NoteSchema,
    request: &CreateWorkTreeRequest,
) -> Result<CreateWorkTreeResult> {
    store.with_transaction(|tx| {
        let root_depth = match &request.parent_id {
            Some(parent_id) => sqlite::require_work_item(tx, parent_id)?.depth + 1,
            None => 0,
        };
        if root_depth > 2 {
            return Err(EngineError::Validation(format!(
                "root depth {root_depth} exceeds maximum of 2"
            )));
        }

        let child_depth = root_depth + 1;
        if child_depth > 2 && !request.children.is_empty() {
            return Err(EngineError::Validation(format!(
                "child depth {child_depth} exceeds maximum of 2"
            )));
        }

        let mut seen_refs = HashSet::new();
        for child in &request.children {
            if child.item_ref == ROOT_REF {
                return Err(EngineError::Validation(
                    "child ref may not be 'root'".into(),
                ));
            }
            if !seen_refs.insert(child.item_ref.as_str()) {
                return Err(EngineError::Validation(format!(
                    "duplicate child ref '{}'",
                    child.item_ref
                )));
            }
        }

        let ids = IdSequence::new();
        let now = Utc::now();
        let root_id = ids.next_id("wi", &request.root.title, now);

        let mut ref_to_id: HashMap<String, String> = HashMap::new();
        ref_to_id.insert(ROOT_REF.to_string(), root_id.clone());
        let mut child_ids = Vec::with_capacity(request.children.len());
        for child in &request.children {
            let id = ids.next_id("wi", &child.spec.title, now);
            ref_to_id.insert(child.item_ref.clone(), id.clone());
            child_ids.push((child, id));
        }

        let mut candidate_deps = Vec::with_capacity(request.deps.len());
        for (index, dep) in request.deps.iter().enumerate() {
            let from_id = ref_to_id
                .get(&dep.from_ref)
                .ok_or_else(|| EngineError::Validation(format!("unresolved dep ref '{}'", dep.from_ref)))?
                .clone();
            let to_id = ref_to_id
                .get(&dep.to_ref)
                .ok_or_else(|| EngineError::Validation(format!("unresolved dep ref '{}'", dep.to_ref)))?
                .clone();
            let dependency = Dependency {
                id: ids.next_id("dep", &format!("{index}"), now),
                from_item_id: from_id,
                to_item_id: to_id,
                dep_type: dep.dep_type,
                unblock_at: dep.unblock_at,
            };
            dependency.validate()?;
            candidate_deps.push(dependency);
        }
        depgraph::check_acyclic(&[], &candidate_deps)?;

        let root_item = build_work_item(&root_id, request.parent_id.clone(), root_depth, &request.root, now);
        sqlite::insert_work_item(tx, &root_item)?;

        let mut children = Vec::with_capacity(child_ids.len());
        for (child, id) in &child_ids {
            let item = build_work_item(id, Some(root_id.clone()), child_depth, &child.spec, now);
            sqlite::insert_work_item(tx, &item)?;
            children.push(item);
        }

        for dependency in &candidate_deps {
            sqlite::insert_dependency(tx, dependency)?;
        }

        let mut notes = Vec::new();
        if request.create_notes {
            notes.extend(create_blank_notes(tx, schema, ROOT_REF, &root_item)?);
            for item in &children {
                let item_ref = child_ids
                    .iter()
                    .find(|(_, id)| id == &item.id)
                    .map(|(child, _)| child.item_ref.clone())
                    .unwrap_or_default();
                notes.extend(create_blank_notes(tx, schema, &item_ref, item)?);
            }
        }

        Ok(CreateWorkTreeResult {
            root: root_item,
            children,
            dependencies: candidate_deps,
            notes,
        })
    })
}

fn build_work_item(id: &str, parent_id: Option<String>, depth: u8, spec: &TreeItemSpec, now: chrono::DateTime<Utc>) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        parent_id,
        depth,
        title: spec.title.clone(),
        summary: spec.summary.clone(),
        description: spec.description.clone(),
        role: Role::Queue,
        status_label: spec.status_label.clone(),
        previous_role: None,
        priority: spec.priority.unwrap_or(Priority::Medium),
        complexity: spec.complexity.unwrap_or(1),
        requires_verification: spec.requires_verification,
        metadata: spec.metadata.clone(),
        tags: spec.tags.clone(),
        created_at: now,
        modified_at: now,
        role_changed_at: now,
        version: 1,
    }
}

fn create_blank_notes(
    tx: &rusqlite::Transaction,
    schema: &NoteSchema,
    item_ref: &str,
    item: &WorkItem,
) -> Result<Vec<TaggedNote>> {
    let mut out = Vec::new();
    for entry in schema.expected_for_tags(&item.tags) {
        let note = sqlite::upsert_note_tx(tx, &item.id, &entry.key, entry.role, "")?;
        out.push(TaggedNote {
            item_ref: item_ref.to_string(),
            note,
        });
    }
    Ok(out)
}

/// Which terminal-bound trigger `complete_tree` should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompleteMode {
    Complete,
    Cancel,
}

impl CompleteMode {
    const fn trigger(self) -> Trigger {
        match self {
            Self::Complete => Trigger::Complete,
            Self::Cancel => Trigger::Cancel,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteTreeRequest {
    pub root_ids: Vec<String>,
    pub mode: CompleteMode,
    #[serde(default)]
    pub cleanup_children: bool,
    /// Tags that exempt an item from cleanup deletion, sourced from
    /// `ServerConfig::preserve_on_cleanup_tags` when the caller omits this.
    #[serde(default)]
    pub preserve_tags: Vec<String>,
}

/// One step's outcome in `complete_tree`'s topological walk.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub item_id: String,
    pub result: std::result::Result<Role, String>,
}

#[derive(Debug, Clone)]
pub struct CompleteTreeResult {
    pub steps: Vec<StepOutcome>,
    pub halted_at: Option<String>,
    pub deleted: Vec<String>,
}

/// Batch-transition every item in the subtree(s) rooted at `root_ids`, in
/// dependency-then-hierarchy topological order (leaves first, blockers
/// before the items they block). Halts on the first failing item; every
/// already-applied step stays committed (partial-commit policy).
///
/// # Errors
///
/// Returns `EngineError::NotFound` if a root id is unknown, or
/// `EngineError::Dependency` if the subtree's completion order is cyclic.
pub fn complete_tree(
    store: &mut SqliteStorage,
    schema: &NoteSchema,
    request: &CompleteTreeRequest,
) -> Result<CompleteTreeResult> {
    store.with_transaction(|tx| {
        let mut subtree = Vec::new();
        let mut seen = HashSet::new();
        for root_id in &request.root_ids {
            collect_subtree(tx, root_id, &mut subtree, &mut seen)?;
        }

        let all_deps = sqlite::list_all_dependencies(tx)?;
        let order = topological_order(&subtree, &all_deps)?;

        let mut steps = Vec::new();
        let mut halted_at = None;

        for item_id in &order {
            let outcome = workflow::apply_one(
                tx,
                schema,
                &AdvanceRequest {
                    item_id: item_id.clone(),
                    trigger: request.mode.trigger(),
                    summary: None,
                },
            );
            match outcome {
                Ok(result) => steps.push(StepOutcome {
                    item_id: item_id.clone(),
                    result: Ok(result.new_role),
                }),
                Err(error) => {
                    steps.push(StepOutcome {
                        item_id: item_id.clone(),
                        result: Err(error.to_string()),
                    });
                    halted_at = Some(item_id.clone());
                    break;
                }
            }
        }

        let mut deleted = Vec::new();
        if halted_at.is_none() && request.cleanup_children {
            deleted = cleanup_non_root_items(tx, &subtree, &request.root_ids, &request.preserve_tags)?;
        }

        Ok(CompleteTreeResult {
            steps,
            halted_at,
            deleted,
        })
    })
}

fn collect_subtree(
    tx: &rusqlite::Transaction,
    root_id: &str,
    out: &mut Vec<WorkItem>,
    seen: &mut HashSet<String>,
) -> Result<()> {
    if !seen.insert(root_id.to_string()) {
        return Ok(());
    }
    let root = sqlite::require_work_item(tx, root_id)?;
    let children = sqlite::list_children(tx, root_id)?;
    out.push(root);
    for child in children {
        collect_subtree(tx, &child.id, out, seen)?;
    }
    Ok(())
}

fn topological_order(items: &[WorkItem], deps: &[Dependency]) -> Result<Vec<String>> {
    let ids: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
    let mut indegree: HashMap<&str, u32> = ids.iter().map(|&id| (id, 0)).collect();
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();

    for item in items {
        if let Some(parent_id) = item.parent_id.as_deref() {
            if ids.contains(parent_id) {
                edges.entry(item.id.as_str()).or_default().push(parent_id);
                *indegree.entry(parent_id).or_insert(0) += 1;
            }
        }
    }
    for dep in deps {
        if let Some((blocker, blocked, _)) = depgraph_as_blocks_edge(dep) {
            if ids.contains(blocker) && ids.contains(blocked) {
                edges.entry(blocker).or_default().push(blocked);
                *indegree.entry(blocked).or_insert(0) += 1;
            }
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut ordered = Vec::with_capacity(items.len());

    while let Some(node) = queue.pop_front() {
        ordered.push(node.to_string());
        if let Some(targets) = edges.get(node) {
            for &target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }
    }

    if ordered.len() != items.len() {
        return Err(EngineError::Dependency(
            "completion order is cyclic between tree hierarchy and dependencies".into(),
        ));
    }

    Ok(ordered)
}

fn depgraph_as_blocks_edge(dep: &Dependency) -> Option<(&str, &str, Role)> {
    match dep.dep_type {
        DependencyType::Blocks => Some((&dep.from_item_id, &dep.to_item_id, dep.effective_unblock_at())),
        DependencyType::IsBlockedBy => Some((&dep.to_item_id, &dep.from_item_id, dep.effective_unblock_at())),
        DependencyType::RelatesTo => None,
    }
}

fn cleanup_non_root_items(
    tx: &rusqlite::Transaction,
    subtree: &[WorkItem],
    root_ids: &[String],
    preserve_tags: &[String],
) -> Result<Vec<String>> {
    let roots: HashSet<&str> = root_ids.iter().map(String::as_str).collect();

    let mut deleted = Vec::new();
    let mut candidates: Vec<&WorkItem> = subtree.iter().filter(|item| !roots.contains(item.id.as_str())).collect();
    candidates.sort_by_key(|item| std::cmp::Reverse(item.depth));

    for item in candidates {
        if preserve_tags.iter().any(|tag| item.tags.iter().any(|t| t == tag)) {
            continue;
        }
        if sqlite::get_work_item(tx, &item.id)?.is_none() {
            continue;
        }
        sqlite::delete_work_item_tx(tx, &item.id, false)?;
        deleted.push(item.id.clone());
    }
    Ok(deleted)
}
