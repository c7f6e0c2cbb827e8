//! Workflow Service: `advance_item`, the single entry point that moves a
//! work item through the role state machine.

use crate::config::NoteSchema;
use crate::error::{EngineError, Result};
use crate::gate;
use crate::model::{EntityType, Role, RoleTransition, Trigger, WorkItem};
use crate::rsm;
use crate::storage::sqlite::{self, SqliteStorage};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;

/// One transition request: move `item_id` via `trigger`, with an optional
/// audit summary.
#[derive(Debug, Clone, Deserialize)]
pub struct AdvanceRequest {
    pub item_id: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub summary: Option<String>,
}

/// A parent-level transition suggested by a child-level one. Never applied
/// automatically; the caller decides whether to act on it in a later call.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeEvent {
    pub item_id: String,
    pub suggested_trigger: Trigger,
    pub from_role: Role,
    pub to_role: Role,
}

/// The result of one successfully applied transition.
#[derive(Debug, Clone)]
pub struct AdvanceResult {
    pub item: WorkItem,
    pub previous_role: Role,
    pub new_role: Role,
    pub cascade_events: Vec<CascadeEvent>,
    pub unblocked_items: Vec<String>,
    pub flow_position: Option<u8>,
}

/// Apply a single transition in its own transaction.
///
/// # Errors
///
/// `EngineError::NotFound` if the item doesn't exist, `InvalidTransition` if
/// the `(role, trigger)` pair is illegal, `GateNotSatisfied` if a required
/// note is unfilled, or `DependencyBlocked` on `start` while blockers remain.
pub fn advance_item(
    store: &mut SqliteStorage,
    schema: &NoteSchema,
    request: &AdvanceRequest,
) -> Result<AdvanceResult> {
    store.with_transaction(|tx| apply_one(tx, schema, request))
}

/// Apply a batch of transitions in input order, all within one transaction.
/// On the first failure the whole batch rolls back; the error message names
/// the failing index so the caller can report it without any partial state
/// having committed.
///
/// # Errors
///
/// Returns `EngineError::OperationFailed` naming the failing index and the
/// underlying error if any step fails; the transaction guarantees nothing
/// from this batch is left committed.
pub fn advance_items_batch(
    store: &mut SqliteStorage,
    schema: &NoteSchema,
    requests: &[AdvanceRequest],
) -> Result<Vec<AdvanceResult>> {
    store.with_transaction(|tx| {
        let mut results = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let result = apply_one(tx, schema, request).map_err(|error| {
                EngineError::OperationFailed(format!(
                    "batch transition {index} (item {}) failed: {error}",
                    request.item_id
                ))
            })?;
            results.push(result);
        }
        Ok(results)
    })
}

/// Apply one transition directly against an already-open transaction. Used
/// by [`advance_item`]/[`advance_items_batch`] and by compound operations
/// (`complete_tree`) that drive transitions as one step of a larger
/// transaction.
pub(crate) fn apply_one(
    tx: &rusqlite::Transaction,
    schema: &NoteSchema,
    request: &AdvanceRequest,
) -> Result<AdvanceResult> {
    let item = sqlite::require_work_item(tx, &request.item_id)?;
    let destination = rsm::resolve_transition(item.role, request.trigger, item.previous_role)?;

    let notes = sqlite::list_notes(tx, &item.id)?;
    let gate = gate::evaluate(schema, &item.tags, destination, &notes);
    if !gate.is_open() {
        return Err(EngineError::GateNotSatisfied {
            missing: gate.missing_required,
        });
    }

    if request.trigger == Trigger::Start {
        let all_deps = sqlite::list_all_dependencies(tx)?;
        let role_of = build_role_lookup(tx, &all_deps)?;
        let blockers =
            crate::depgraph::unsatisfied_blockers(&all_deps, &item.id, &|id| role_of.get(id).copied());
        if !blockers.is_empty() {
            return Err(EngineError::DependencyBlocked { blockers });
        }
    }

    let new_previous_role = if destination == Role::Blocked {
        Some(item.role)
    } else {
        None
    };
    let new_status_label = None;

    let transition = RoleTransition {
        id: 0,
        entity_id: item.id.clone(),
        entity_type: EntityType::from_depth(item.depth),
        from_role: item.role,
        to_role: destination,
        from_status: item.status_label.clone(),
        to_status: new_status_label.clone(),
        transitioned_at: Utc::now(),
        trigger: request.trigger,
        summary: request.summary.clone(),
    };

    let updated = sqlite::apply_role_change_tx(
        tx,
        &item.id,
        destination,
        new_previous_role,
        new_status_label,
        item.version,
    )?;
    sqlite::record_role_transition(tx, &transition)?;

    let cascade_events = compute_cascade_events(tx, &item, request.trigger, destination)?;

    let all_deps = sqlite::list_all_dependencies(tx)?;
    let role_of = build_role_lookup(tx, &all_deps)?;
    let unblocked_items =
        crate::depgraph::newly_unblocked(&all_deps, &item.id, &|id| role_of.get(id).copied());

    let flow_position = destination.order();

    Ok(AdvanceResult {
        item: updated,
        previous_role: item.role,
        new_role: destination,
        cascade_events,
        unblocked_items,
        flow_position,
    })
}

fn build_role_lookup(
    tx: &rusqlite::Transaction,
    deps: &[crate::model::Dependency],
) -> Result<HashMap<String, Role>> {
    let mut ids: Vec<String> = deps
        .iter()
        .flat_map(|d| [d.from_item_id.clone(), d.to_item_id.clone()])
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let mut map = HashMap::with_capacity(ids.len());
    for id in ids {
        if let Some(item) = sqlite::get_work_item(tx, &id)? {
            map.insert(id, item.role);
        }
    }
    Ok(map)
}

fn compute_cascade_events(
    tx: &rusqlite::Transaction,
    child: &WorkItem,
    trigger: Trigger,
    destination: Role,
) -> Result<Vec<CascadeEvent>> {
    let Some(parent_id) = child.parent_id.clone() else {
        return Ok(vec![]);
    };
    if !rsm::may_cascade(trigger) {
        return Ok(vec![]);
    }

    let parent = sqlite::require_work_item(tx, &parent_id)?;
    let counts = sqlite::count_children_by_role(tx, &parent_id)?;
    let total: i64 = counts.values().sum();

    let candidate = match (trigger, destination) {
        (Trigger::Complete | Trigger::Cancel, Role::Terminal) => {
            rsm::all_children_terminal(&counts, total)
                .then_some((Trigger::Complete, Role::Terminal))
        }
        (Trigger::Start, Role::Work) if parent.role == Role::Queue => {
            rsm::is_first_child_to_leave_queue(&counts, total)
                .then_some((Trigger::Start, Role::Work))
        }
        _ => None,
    };

    Ok(candidate
        .filter(|(trigger, _)| rsm::is_legal(parent.role, *trigger, parent.previous_role))
        .map(|(trigger, to_role)| CascadeEvent {
            item_id: parent.id.clone(),
            suggested_trigger: trigger,
            from_role: parent.role,
            to_role,
        })
        .into_iter()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dependency, DependencyType, Priority};
    use chrono::Utc;

    fn new_item(id: &str, parent_id: Option<&str>, depth: u8, role: Role) -> WorkItem {
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

    fn empty_schema() -> NoteSchema {
        serde_yaml::from_str("{}").unwrap()
    }

    #[test]
    fn start_moves_item_and_records_audit() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store.create_work_item(&new_item("a", None, 0, Role::Queue)).unwrap();
        let schema = empty_schema();

        let result = advance_item(
            &mut store,
            &schema,
            &AdvanceRequest {
                item_id: "a".into(),
                trigger: Trigger::Start,
                summary: None,
            },
        )
        .unwrap();

        assert_eq!(result.new_role, Role::Work);
        assert_eq!(result.previous_role, Role::Queue);
        assert_eq!(store.list_role_transitions("a").unwrap().len(), 1);
    }

    #[test]
    fn start_blocked_by_unsatisfied_dependency() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store.create_work_item(&new_item("a", None, 0, Role::Queue)).unwrap();
        store.create_work_item(&new_item("b", None, 0, Role::Queue)).unwrap();
        store
            .create_dependency(&Dependency {
                id: "d1".into(),
                from_item_id: "a".into(),
                to_item_id: "b".into(),
                dep_type: DependencyType::Blocks,
                unblock_at: Some(Role::Terminal),
            })
            .unwrap();
        let schema = empty_schema();

        let err = advance_item(
            &mut store,
            &schema,
            &AdvanceRequest {
                item_id: "b".into(),
                trigger: Trigger::Start,
                summary: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::DependencyBlocked { .. }));
    }

    #[test]
    fn complete_reports_unblocked_dependent() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store.create_work_item(&new_item("a", None, 0, Role::Work)).unwrap();
        store.create_work_item(&new_item("b", None, 0, Role::Queue)).unwrap();
        store
            .create_dependency(&Dependency {
                id: "d1".into(),
                from_item_id: "a".into(),
                to_item_id: "b".into(),
                dep_type: DependencyType::Blocks,
                unblock_at: Some(Role::Terminal),
            })
            .unwrap();
        let schema = empty_schema();

        let result = advance_item(
            &mut store,
            &schema,
            &AdvanceRequest {
                item_id: "a".into(),
                trigger: Trigger::Complete,
                summary: None,
            },
        )
        .unwrap();
        assert_eq!(result.unblocked_items, vec!["b".to_string()]);
    }

    #[test]
    fn resume_restores_previous_role() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store.create_work_item(&new_item("a", None, 0, Role::Work)).unwrap();
        let schema = empty_schema();

        advance_item(
            &mut store,
            &schema,
            &AdvanceRequest {
                item_id: "a".into(),
                trigger: Trigger::Block,
                summary: None,
            },
        )
        .unwrap();
        let blocked = store.get_work_item("a").unwrap().unwrap();
        assert_eq!(blocked.role, Role::Blocked);
        assert_eq!(blocked.previous_role, Some(Role::Work));

        let resumed = advance_item(
            &mut store,
            &schema,
            &AdvanceRequest {
                item_id: "a".into(),
                trigger: Trigger::Resume,
                summary: None,
            },
        )
        .unwrap();
        assert_eq!(resumed.new_role, Role::Work);
    }

    #[test]
    fn batch_rolls_back_entirely_on_failure() {
        let mut store = SqliteStorage::open_memory().unwrap();
        store.create_work_item(&new_item("a", None, 0, Role::Queue)).unwrap();
        store.create_work_item(&new_item("b", None, 0, Role::Terminal)).unwrap();
        let schema = empty_schema();

        let err = advance_items_batch(
            &mut store,
            &schema,
            &[
                AdvanceRequest {
                    item_id: "a".into(),
                    trigger: Trigger::Start,
                    summary: None,
                },
                AdvanceRequest {
                    item_id: "b".into(),
                    trigger: Trigger::Start,
                    summary: None,
                },
            ],
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::OperationFailed(_)));

        let a = store.get_work_item("a").unwrap().unwrap();
        assert_eq!(a.role, Role::Queue, "first step must roll back too");
    }
}
