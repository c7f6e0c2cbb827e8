//! Query Services: search, hierarchical overviews, the next-actionable-item
//! recommender, blocked-item analysis, and the per-item context bundle.

use crate::config::NoteSchema;
use crate::depgraph;
use crate::error::Result;
use crate::gate::{self, GateResult};
use crate::model::{Dependency, Note, Role, WorkItem};
use crate::storage::sqlite::{SearchFilters, SearchSort, SortDirection, SqliteStorage};
use std::collections::HashMap;

/// One page of a filtered search.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub items: Vec<WorkItem>,
    pub total: i64,
    pub returned: i64,
    pub limit: i64,
    pub offset: i64,
    pub ancestors: HashMap<String, Vec<WorkItem>>,
}

/// Run a filtered, paginated search. When `include_ancestors` is set, each
/// returned item's ancestor chain is fetched and keyed by item id.
///
/// # Errors
///
/// Returns an error if the underlying query fails.
pub fn search(
    store: &SqliteStorage,
    filters: &SearchFilters,
    sort: SearchSort,
    direction: SortDirection,
    include_ancestors: bool,
) -> Result<SearchPage> {
    let (items, total) = store.find_by_filters(filters, sort, direction)?;
    let returned = items.len() as i64;

    let mut ancestors = HashMap::new();
    if include_ancestors {
        for item in &items {
            let chain = store.find_ancestor_chain(&item.id)?;
            ancestors.insert(item.id.clone(), chain);
        }
    }

    Ok(SearchPage {
        items,
        total,
        returned,
        limit: filters.limit,
        offset: filters.offset,
        ancestors,
    })
}

/// Role counts for an item's direct children, keyed by role name.
pub type RoleCounts = HashMap<Role, i64>;

/// Overview of a single item: the item, its children's role counts, and the
/// children themselves.
#[derive(Debug, Clone)]
pub struct ItemOverview {
    pub item: WorkItem,
    pub child_role_counts: RoleCounts,
    pub children: Vec<WorkItem>,
}

/// Overview of the forest: each root item alongside its subtree's role
/// counts and (optionally) its direct children.
#[derive(Debug, Clone)]
pub struct RootOverview {
    pub root: WorkItem,
    pub child_role_counts: RoleCounts,
    pub children: Option<Vec<WorkItem>>,
}

pub enum Overview {
    Item(ItemOverview),
    Roots(Vec<RootOverview>),
}

/// Build an overview. With `item_id` set, returns a single-item overview;
/// otherwise returns the root forest with per-root child role counts and,
/// when `include_children` is set, each root's direct children.
///
/// # Errors
///
/// Returns `EngineError::NotFound` if `item_id` is given but unresolved.
pub fn overview(store: &SqliteStorage, item_id: Option<&str>, include_children: bool) -> Result<Overview> {
    if let Some(id) = item_id {
        let item = store.get_work_item(id)?.ok_or_else(|| crate::error::EngineError::not_found("work item", id))?;
        let child_role_counts = store.count_children_by_role(id)?;
        let children = store.list_children(id)?;
        return Ok(Overview::Item(ItemOverview {
            item,
            child_role_counts,
            children,
        }));
    }

    let roots = store.find_root_items()?;
    let mut out = Vec::with_capacity(roots.len());
    for root in roots {
        let child_role_counts = store.count_children_by_role(&root.id)?;
        let children = if include_children {
            Some(store.list_children(&root.id)?)
        } else {
            None
        };
        out.push(RootOverview {
            root,
            child_role_counts,
            children,
        });
    }
    Ok(Overview::Roots(out))
}

/// The single most actionable item: not `blocked` or `terminal`, with no
/// unsatisfied blockers, highest priority first, ties broken by deepest
/// item first then by oldest `createdAt`.
///
/// # Errors
///
/// Returns an error if the underlying scan fails.
pub fn get_next_item(store: &SqliteStorage) -> Result<Option<WorkItem>> {
    let filters = SearchFilters {
        limit: i64::MAX,
        ..SearchFilters::default()
    };
    let (candidates, _) = store.find_by_filters(&filters, SearchSort::CreatedAt, SortDirection::Asc)?;
    let edges = store.list_all_dependencies()?;
    let role_of = build_role_lookup(&candidates);

    let mut actionable: Vec<&WorkItem> = candidates
        .iter()
        .filter(|item| !matches!(item.role, Role::Blocked | Role::Terminal))
        .filter(|item| !depgraph::is_blocked(&edges, &item.id, &|id| role_of.get(id).copied()))
        .collect();

    actionable.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.depth.cmp(&a.depth))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    Ok(actionable.into_iter().next().cloned())
}

fn build_role_lookup(items: &[WorkItem]) -> HashMap<String, Role> {
    items.iter().map(|i| (i.id.clone(), i.role)).collect()
}

/// An item currently blocked, with the blocker ids and their current roles.
#[derive(Debug, Clone)]
pub struct BlockedItem {
    pub item: WorkItem,
    pub blockers: Vec<(String, Role)>,
}

/// Enumerate every item currently blocked by at least one unsatisfied
/// dependency.
///
/// # Errors
///
/// Returns an error if the underlying scan fails.
pub fn get_blocked_items(store: &SqliteStorage) -> Result<Vec<BlockedItem>> {
    let filters = SearchFilters {
        limit: i64::MAX,
        ..SearchFilters::default()
    };
    let (items, _) = store.find_by_filters(&filters, SearchSort::CreatedAt, SortDirection::Asc)?;
    let edges = store.list_all_dependencies()?;
    let role_of = build_role_lookup(&items);

    let mut out = Vec::new();
    for item in items {
        let unsatisfied = depgraph::unsatisfied_blockers(&edges, &item.id, &|id| role_of.get(id).copied());
        if unsatisfied.is_empty() {
            continue;
        }
        let blockers = unsatisfied
            .into_iter()
            .map(|id| {
                let role = role_of.get(&id).copied().unwrap_or(Role::Queue);
                (id, role)
            })
            .collect();
        out.push(BlockedItem { item, blockers });
    }
    Ok(out)
}

/// Session-resume bundle for a single item.
#[derive(Debug, Clone)]
pub struct ItemContext {
    pub item: WorkItem,
    pub notes: Vec<Note>,
    pub gate: GateResult,
    pub parents: Vec<WorkItem>,
    pub children: Vec<WorkItem>,
    pub open_blockers: Vec<(String, Role)>,
}

/// Assemble the one-call session-resume bundle: item, its notes with gate
/// status evaluated against its current role, immediate parents/children,
/// and any open blockers.
///
/// # Errors
///
/// Returns `EngineError::NotFound` if `item_id` doesn't resolve.
pub fn get_context(store: &SqliteStorage, schema: &NoteSchema, item_id: &str) -> Result<ItemContext> {
    let item = store
        .get_work_item(item_id)?
        .ok_or_else(|| crate::error::EngineError::not_found("work item", item_id))?;
    let notes = store.list_notes(item_id)?;
    let gate_result = gate::evaluate(schema, &item.tags, item.role, &notes);

    let parents = if let Some(parent_id) = &item.parent_id {
        store.find_ancestor_chain(parent_id)?
    } else {
        vec![]
    };
    let children = store.list_children(item_id)?;

    let edges = store.list_dependencies_for_items(&[item_id.to_string()])?;
    let all_ids: Vec<String> = edges
        .iter()
        .flat_map(|d: &Dependency| [d.from_item_id.clone(), d.to_item_id.clone()])
        .collect();
    let mut role_of = HashMap::new();
    for id in all_ids {
        if let Some(other) = store.get_work_item(&id)? {
            role_of.insert(id, other.role);
        }
    }
    let open_blockers = depgraph::declared_blockers(&edges, item_id)
        .into_iter()
        .filter(|(blocker_id, threshold)| {
            role_of.get(blocker_id).is_none_or(|role| !role.reaches(*threshold))
        })
        .map(|(blocker_id, _)| {
            let role = role_of.get(&blocker_id).copied().unwrap_or(Role::Queue);
            (blocker_id, role)
        })
        .collect();

    Ok(ItemContext {
        item,
        notes,
        gate: gate_result,
        parents,
        children,
        open_blockers,
    })
}
