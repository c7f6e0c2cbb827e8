//! The external tool surface: 13 operations, each returning the standard
//! response envelope `{success, message, data, error, metadata}`. Wire
//! framing (stdio/HTTP message plumbing, the tool registry) lives outside
//! this crate; this module is the typed Rust surface a transport adapter
//! calls into.

use crate::compound::{self, CompleteTreeRequest, CreateWorkTreeRequest};
use crate::depgraph::{self, Direction};
use crate::error::{EngineError, ErrorCode, Result};
use crate::model::{Dependency, DependencyType, Note, Role, WorkItem};
use crate::query;
use crate::rsm;
use crate::storage::sqlite::{SearchFilters, SearchSort, SortDirection, SqliteStorage, WorkItemUpdate};
use crate::util::id::derive_id;
use crate::workflow::{self, AdvanceRequest};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

/// The envelope every tool call returns.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
    pub error: Option<ToolErrorBody>,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolErrorBody {
    pub code: ErrorCode,
    pub details: String,
    pub additional_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub timestamp: chrono::DateTime<Utc>,
    pub version: &'static str,
}

impl ResponseMetadata {
    fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

fn success(data: Value, message: impl Into<String>) -> ToolResponse {
    ToolResponse {
        success: true,
        message: message.into(),
        data: Some(data),
        error: None,
        metadata: ResponseMetadata::now(),
    }
}

fn failure(error: &EngineError) -> ToolResponse {
    let additional_data = match error {
        EngineError::Conflict { expected, current, .. } => {
            Some(json!({ "expected": expected, "current": current }))
        }
        EngineError::GateNotSatisfied { missing } => Some(json!({ "missing": missing })),
        EngineError::DependencyBlocked { blockers } => Some(json!({ "blockers": blockers })),
        _ => None,
    };
    ToolResponse {
        success: false,
        message: error.to_string(),
        data: None,
        error: Some(ToolErrorBody {
            code: error.code(),
            details: error.to_string(),
            additional_data,
        }),
        metadata: ResponseMetadata::now(),
    }
}

fn respond<T>(result: Result<T>, message: &str, to_value: impl FnOnce(T) -> Value) -> ToolResponse {
    match result {
        Ok(value) => success(to_value(value), message),
        Err(ref error) => failure(error),
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn role_counts_json(counts: &HashMap<Role, i64>) -> Value {
    let map: serde_json::Map<String, Value> = counts
        .iter()
        .map(|(role, count)| (role.as_str().to_string(), json!(count)))
        .collect();
    Value::Object(map)
}

fn blockers_json(blockers: &[(String, Role)]) -> Value {
    Value::Array(
        blockers
            .iter()
            .map(|(id, role)| json!({ "itemId": id, "role": role.as_str() }))
            .collect(),
    )
}

/// Owns the store and the frozen note schema; the entry point a transport
/// adapter constructs once per connection (or once per process for stdio).
pub struct Engine {
    store: SqliteStorage,
    schema: &'static crate::config::NoteSchema,
    default_preserve_tags: Vec<String>,
}

impl Engine {
    #[must_use]
    pub fn new(store: SqliteStorage, default_preserve_tags: Vec<String>) -> Self {
        Self {
            store,
            schema: crate::config::note_schema(),
            default_preserve_tags,
        }
    }
}

// --- manage_items ---

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ManageItemsOp {
    Create {
        #[serde(default)]
        parent_id: Option<String>,
        title: String,
        #[serde(default)]
        summary: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        priority: Option<crate::model::Priority>,
        #[serde(default)]
        complexity: Option<u8>,
        #[serde(default)]
        requires_verification: bool,
        #[serde(default)]
        metadata: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        status_label: Option<String>,
    },
    Update {
        id: String,
        #[serde(default)]
        updates: WorkItemUpdate,
        #[serde(default)]
        expected_version: Option<i64>,
    },
    Delete {
        id: String,
        #[serde(default)]
        recursive: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManageItemsRequest {
    pub ops: Vec<ManageItemsOp>,
}

impl Engine {
    /// Create, update, or delete work items. Array-valued: every op runs
    /// independently (no shared transaction across ops), and the envelope's
    /// `success` reflects whether every op succeeded.
    pub fn manage_items(&mut self, request: &ManageItemsRequest) -> ToolResponse {
        let mut outcomes = Vec::with_capacity(request.ops.len());
        let mut all_ok = true;

        for op in &request.ops {
            let outcome: Result<Value> = match op {
                ManageItemsOp::Create {
                    parent_id,
                    title,
                    summary,
                    description,
                    priority,
                    complexity,
                    requires_verification,
                    metadata,
                    tags,
                    status_label,
                } => self
                    .create_item(
                        parent_id.as_deref(),
                        title,
                        summary,
                        description.clone(),
                        *priority,
                        *complexity,
                        *requires_verification,
                        metadata.clone(),
                        tags.clone(),
                        status_label.clone(),
                    )
                    .map(|item| to_json(&item)),
                ManageItemsOp::Update {
                    id,
                    updates,
                    expected_version,
                } => self
                    .store
                    .update_work_item(id, updates, *expected_version)
                    .map(|item| to_json(&item)),
                ManageItemsOp::Delete { id, recursive } => self
                    .store
                    .delete_work_item(id, *recursive)
                    .map(|()| json!({ "id": id })),
            };

            if outcome.is_err() {
                all_ok = false;
            }
            outcomes.push(match outcome {
                Ok(data) => json!({ "success": true, "data": data }),
                Err(error) => json!({ "success": false, "error": error.to_string() }),
            });
        }

        let message = if all_ok {
            format!("{} item operation(s) applied", request.ops.len())
        } else {
            "one or more item operations failed".to_string()
        };
        let mut response = success(Value::Array(outcomes), message);
        response.success = all_ok;
        response
    }

    #[allow(clippy::too_many_arguments)]
    fn create_item(
        &mut self,
        parent_id: Option<&str>,
        title: &str,
        summary: &str,
        description: Option<String>,
        priority: Option<crate::model::Priority>,
        complexity: Option<u8>,
        requires_verification: bool,
        metadata: Option<String>,
        tags: Vec<String>,
        status_label: Option<String>,
    ) -> Result<WorkItem> {
        let depth = match parent_id {
            Some(id) => {
                let parent = self
                    .store
                    .get_work_item(id)?
                    .ok_or_else(|| EngineError::not_found("work item", id))?;
                parent.depth + 1
            }
            None => 0,
        };
        let now = Utc::now();
        let item = WorkItem {
            id: derive_id("wi", title, now),
            parent_id: parent_id.map(ToString::to_string),
            depth,
            title: title.to_string(),
            summary: summary.to_string(),
            description,
            role: Role::Queue,
            status_label,
            previous_role: None,
            priority: priority.unwrap_or(crate::model::Priority::Medium),
            complexity: complexity.unwrap_or(1),
            requires_verification,
            metadata,
            tags,
            created_at: now,
            modified_at: now,
            role_changed_at: now,
            version: 1,
        };
        self.store.create_work_item(&item)?;
        Ok(item)
    }
}

// --- query_items ---

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueryItemsRequest {
    Get {
        id: String,
    },
    Search {
        #[serde(default)]
        filters: SearchFilters,
        #[serde(default = "default_sort")]
        sort: SearchSort,
        #[serde(default = "default_direction")]
        direction: SortDirection,
        #[serde(default)]
        include_ancestors: bool,
    },
    Overview {
        #[serde(default)]
        item_id: Option<String>,
        #[serde(default)]
        include_children: bool,
    },
}

fn default_sort() -> SearchSort {
    SearchSort::CreatedAt
}

fn default_direction() -> SortDirection {
    SortDirection::Asc
}

impl Engine {
    pub fn query_items(&self, request: &QueryItemsRequest) -> ToolResponse {
        match request {
            QueryItemsRequest::Get { id } => {
                let result = self
                    .store
                    .get_work_item(id)
                    .and_then(|opt| opt.ok_or_else(|| EngineError::not_found("work item", id)));
                respond(result, "item fetched", |item| to_json(&item))
            }
            QueryItemsRequest::Search {
                filters,
                sort,
                direction,
                include_ancestors,
            } => {
                let result = query::search(&self.store, filters, *sort, *direction, *include_ancestors);
                respond(result, "search complete", |page| {
                    json!({
                        "items": page.items.iter().map(to_json).collect::<Vec<_>>(),
                        "total": page.total,
                        "returned": page.returned,
                        "limit": page.limit,
                        "offset": page.offset,
                        "ancestors": page.ancestors.iter().map(|(id, chain)| {
                            (id.clone(), chain.iter().map(to_json).collect::<Vec<_>>())
                        }).collect::<HashMap<_, _>>(),
                    })
                })
            }
            QueryItemsRequest::Overview {
                item_id,
                include_children,
            } => {
                let result = query::overview(&self.store, item_id.as_deref(), *include_children);
                respond(result, "overview computed", |overview| match overview {
                    query::Overview::Item(item_overview) => json!({
                        "item": to_json(&item_overview.item),
                        "childRoleCounts": role_counts_json(&item_overview.child_role_counts),
                        "children": item_overview.children.iter().map(to_json).collect::<Vec<_>>(),
                    }),
                    query::Overview::Roots(roots) => json!({
                        "roots": roots.into_iter().map(|r| json!({
                            "item": to_json(&r.root),
                            "childRoleCounts": role_counts_json(&r.child_role_counts),
                            "children": r.children.map(|c| c.iter().map(to_json).collect::<Vec<_>>()),
                        })).collect::<Vec<_>>(),
                    }),
                })
            }
        }
    }
}

// --- manage_notes / query_notes ---

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ManageNotesRequest {
    Upsert {
        item_id: String,
        key: String,
        role: Role,
        #[serde(default)]
        body: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryNotesRequest {
    pub item_id: String,
    #[serde(default = "default_true")]
    pub include_body: bool,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub key: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Engine {
    pub fn manage_notes(&mut self, request: &ManageNotesRequest) -> ToolResponse {
        match request {
            ManageNotesRequest::Upsert { item_id, key, role, body } => {
                let result = crate::notes::upsert(&mut self.store, item_id, key, *role, body);
                respond(result, "note upserted", |note| to_json(&note))
            }
            ManageNotesRequest::Delete { id } => {
                let result = crate::notes::delete(&mut self.store, id);
                respond(result, "note deleted", |()| json!({ "id": id }))
            }
        }
    }

    pub fn query_notes(&self, request: &QueryNotesRequest) -> ToolResponse {
        let result = crate::notes::list_filtered(&self.store, &request.item_id, request.role, request.key.as_deref());
        respond(result, "notes fetched", |notes: Vec<Note>| {
            let notes = if request.include_body {
                notes
            } else {
                notes
                    .into_iter()
                    .map(|mut n| {
                        n.body.clear();
                        n
                    })
                    .collect()
            };
            Value::Array(notes.iter().map(to_json).collect())
        })
    }
}

// --- manage_dependencies / query_dependencies ---

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum DependencyPattern {
    Single {
        from: String,
        to: String,
        dep_type: DependencyType,
        #[serde(default)]
        unblock_at: Option<Role>,
    },
    /// Chains `refs[0] -> refs[1] -> .. -> refs[n]`.
    Linear {
        refs: Vec<String>,
        dep_type: DependencyType,
        #[serde(default)]
        unblock_at: Option<Role>,
    },
    FanOut {
        from: String,
        to: Vec<String>,
        dep_type: DependencyType,
        #[serde(default)]
        unblock_at: Option<Role>,
    },
    FanIn {
        from: Vec<String>,
        to: String,
        dep_type: DependencyType,
        #[serde(default)]
        unblock_at: Option<Role>,
    },
}

impl DependencyPattern {
    fn pairs(&self) -> Vec<(String, String, DependencyType, Option<Role>)> {
        match self {
            Self::Single { from, to, dep_type, unblock_at } => {
                vec![(from.clone(), to.clone(), *dep_type, *unblock_at)]
            }
            Self::Linear { refs, dep_type, unblock_at } => refs
                .windows(2)
                .map(|pair| (pair[0].clone(), pair[1].clone(), *dep_type, *unblock_at))
                .collect(),
            Self::FanOut { from, to, dep_type, unblock_at } => to
                .iter()
                .map(|t| (from.clone(), t.clone(), *dep_type, *unblock_at))
                .collect(),
            Self::FanIn { from, to, dep_type, unblock_at } => from
                .iter()
                .map(|f| (f.clone(), to.clone(), *dep_type, *unblock_at))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ManageDependenciesRequest {
    Create(DependencyPattern),
    Delete { id: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QueryDependenciesRequest {
    Neighbors { item_id: String, direction: Direction },
    Traverse {
        seed: String,
        #[serde(default = "default_max_depth")]
        max_depth: u32,
    },
}

fn default_max_depth() -> u32 {
    5
}

impl Engine {
    pub fn manage_dependencies(&mut self, request: &ManageDependenciesRequest) -> ToolResponse {
        match request {
            ManageDependenciesRequest::Create(pattern) => {
                let pairs = pattern.pairs();
                let now = Utc::now();
                let result = self.store.with_transaction(|tx| {
                    let existing = crate::storage::sqlite::list_all_dependencies(tx)?;
                    let mut candidates = Vec::with_capacity(pairs.len());
                    for (index, (from, to, dep_type, unblock_at)) in pairs.iter().enumerate() {
                        let dependency = Dependency {
                            id: derive_id("dep", &format!("{from}:{to}:{index}"), now),
                            from_item_id: from.clone(),
                            to_item_id: to.clone(),
                            dep_type: *dep_type,
                            unblock_at: *unblock_at,
                        };
                        dependency.validate()?;
                        candidates.push(dependency);
                    }
                    depgraph::check_acyclic(&existing, &candidates)?;
                    for dependency in &candidates {
                        crate::storage::sqlite::insert_dependency(tx, dependency)?;
                    }
                    Ok(candidates)
                });
                respond(result, "dependencies created", |deps| {
                    Value::Array(deps.iter().map(to_json).collect())
                })
            }
            ManageDependenciesRequest::Delete { id } => {
                let result = self.store.delete_dependency(id);
                respond(result, "dependency deleted", |()| json!({ "id": id }))
            }
        }
    }

    pub fn query_dependencies(&self, request: &QueryDependenciesRequest) -> ToolResponse {
        match request {
            QueryDependenciesRequest::Neighbors { item_id, direction } => {
                let result = self.store.list_dependencies_for_items(&[item_id.clone()]);
                respond(result, "neighbors fetched", |edges| {
                    let matched = depgraph::neighbors(&edges, item_id, *direction);
                    Value::Array(matched.into_iter().map(to_json).collect())
                })
            }
            QueryDependenciesRequest::Traverse { seed, max_depth } => {
                let result = self.store.list_all_dependencies();
                respond(result, "traversal complete", |edges| {
                    json!(depgraph::bfs(&edges, seed, *max_depth))
                })
            }
        }
    }
}

// --- advance_item / get_next_status ---

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AdvanceItemRequest {
    Batch { transitions: Vec<AdvanceRequest> },
    Single(AdvanceRequest),
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetNextStatusRequest {
    pub item_id: String,
}

impl Engine {
    pub fn advance_item(&mut self, request: &AdvanceItemRequest) -> ToolResponse {
        match request {
            AdvanceItemRequest::Single(single) => {
                let result = workflow::advance_item(&mut self.store, self.schema, single);
                respond(result, "transition applied", |r| advance_result_json(&r))
            }
            AdvanceItemRequest::Batch { transitions } => {
                let result = workflow::advance_items_batch(&mut self.store, self.schema, transitions);
                respond(result, "batch applied", |results| {
                    Value::Array(results.iter().map(advance_result_json).collect())
                })
            }
        }
    }

    pub fn get_next_status(&self, request: &GetNextStatusRequest) -> ToolResponse {
        let result = self
            .store
            .get_work_item(&request.item_id)
            .and_then(|opt| opt.ok_or_else(|| EngineError::not_found("work item", &request.item_id)));

        respond(result, "next status computed", |item| {
            let triggers = [
                crate::model::Trigger::Start,
                crate::model::Trigger::Complete,
                crate::model::Trigger::Block,
                crate::model::Trigger::Hold,
                crate::model::Trigger::Resume,
                crate::model::Trigger::Cancel,
            ];
            let candidates: Vec<Value> = triggers
                .iter()
                .filter_map(|&trigger| {
                    rsm::resolve_transition(item.role, trigger, item.previous_role)
                        .ok()
                        .map(|to_role| json!({ "trigger": trigger.as_str(), "toRole": to_role.as_str() }))
                })
                .collect();
            let recommended = rsm::next_status(item.role, item.previous_role)
                .map(|(trigger, to_role)| json!({ "trigger": trigger.as_str(), "toRole": to_role.as_str() }));
            json!({ "currentRole": item.role.as_str(), "candidates": candidates, "recommended": recommended })
        })
    }
}

fn advance_result_json(result: &workflow::AdvanceResult) -> Value {
    json!({
        "item": to_json(&result.item),
        "previousRole": result.previous_role.as_str(),
        "newRole": result.new_role.as_str(),
        "cascadeEvents": result.cascade_events.iter().map(|c| json!({
            "itemId": c.item_id,
            "suggestedTrigger": c.suggested_trigger.as_str(),
            "fromRole": c.from_role.as_str(),
            "toRole": c.to_role.as_str(),
        })).collect::<Vec<_>>(),
        "unblockedItems": result.unblocked_items,
        "flowPosition": result.flow_position,
    })
}

// --- get_next_item / get_blocked_items ---

impl Engine {
    pub fn get_next_item(&self) -> ToolResponse {
        let result = query::get_next_item(&self.store);
        respond(result, "next item computed", |item| match item {
            Some(item) => to_json(&item),
            None => Value::Null,
        })
    }

    pub fn get_blocked_items(&self) -> ToolResponse {
        let result = query::get_blocked_items(&self.store);
        respond(result, "blocked items enumerated", |items| {
            Value::Array(
                items
                    .iter()
                    .map(|b| {
                        json!({
                            "item": to_json(&b.item),
                            "blockers": blockers_json(&b.blockers),
                        })
                    })
                    .collect(),
            )
        })
    }
}

// --- create_work_tree / complete_tree ---

impl Engine {
    pub fn create_work_tree(&mut self, request: &CreateWorkTreeRequest) -> ToolResponse {
        let result = compound::create_work_tree(&mut self.store, self.schema, request);
        respond(result, "work tree created", |tree| {
            json!({
                "root": to_json(&tree.root),
                "children": tree.children.iter().map(to_json).collect::<Vec<_>>(),
                "dependencies": tree.dependencies.iter().map(to_json).collect::<Vec<_>>(),
                "notes": tree.notes.iter().map(|n| json!({
                    "itemRef": n.item_ref,
                    "note": to_json(&n.note),
                })).collect::<Vec<_>>(),
            })
        })
    }

    pub fn complete_tree(&mut self, request: &CompleteTreeRequest) -> ToolResponse {
        let mut request = request.clone();
        if request.preserve_tags.is_empty() {
            request.preserve_tags.clone_from(&self.default_preserve_tags);
        }
        let result = compound::complete_tree(&mut self.store, self.schema, &request);
        respond(result, "tree completion processed", |outcome| {
            json!({
                "steps": outcome.steps.iter().map(|s| json!({
                    "itemId": s.item_id,
                    "newRole": s.result.as_ref().ok().map(|r| r.as_str()),
                    "error": s.result.as_ref().err(),
                })).collect::<Vec<_>>(),
                "haltedAt": outcome.halted_at,
                "deleted": outcome.deleted,
            })
        })
    }
}

// --- get_context ---

#[derive(Debug, Clone, Deserialize)]
pub struct GetContextRequest {
    pub item_id: String,
}

impl Engine {
    pub fn get_context(&self, request: &GetContextRequest) -> ToolResponse {
        let result = query::get_context(&self.store, self.schema, &request.item_id);
        respond(result, "context assembled", |context| {
            json!({
                "item": to_json(&context.item),
                "notes": context.notes.iter().map(to_json).collect::<Vec<_>>(),
                "gate": {
                    "status": if context.gate.is_open() { "open" } else { "closed" },
                    "expectedNotes": context.gate.expected_notes.iter().map(to_json).collect::<Vec<_>>(),
                    "missingRequired": context.gate.missing_required,
                },
                "parents": context.parents.iter().map(to_json).collect::<Vec<_>>(),
                "children": context.children.iter().map(to_json).collect::<Vec<_>>(),
                "openBlockers": blockers_json(&context.open_blockers),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compound::TreeItemSpec;

    fn engine() -> Engine {
        Engine::new(SqliteStorage::open_memory().unwrap(), vec!["bugfix".to_string()])
    }

    #[test]
    fn create_then_get_round_trips_through_envelope() {
        let mut eng = engine();
        let response = eng.manage_items(&ManageItemsRequest {
            ops: vec![ManageItemsOp::Create {
                parent_id: None,
                title: "Root".into(),
                summary: String::new(),
                description: None,
                priority: None,
                complexity: None,
                requires_verification: false,
                metadata: None,
                tags: vec![],
                status_label: None,
            }],
        });
        assert!(response.success);
        let data = response.data.unwrap();
        let id = data[0]["data"]["id"].as_str().unwrap().to_string();

        let get = eng.query_items(&QueryItemsRequest::Get { id: id.clone() });
        assert!(get.success);
        assert_eq!(get.data.unwrap()["title"], "Root");
    }

    #[test]
    fn advance_item_not_found_maps_to_resource_not_found_code() {
        let mut eng = engine();
        let response = eng.advance_item(&AdvanceItemRequest::Single(AdvanceRequest {
            item_id: "missing".into(),
            trigger: crate::model::Trigger::Start,
            summary: None,
        }));
        assert!(!response.success);
        assert_eq!(response.error.unwrap().code, ErrorCode::ResourceNotFound);
    }

    #[test]
    fn create_work_tree_then_complete_tree_end_to_end() {
        let mut eng = engine();
        let tree_response = eng.create_work_tree(&CreateWorkTreeRequest {
            root: TreeItemSpec {
                title: "Feature".into(),
                ..Default::default()
            },
            parent_id: None,
            children: vec![],
            deps: vec![],
            create_notes: false,
        });
        assert!(tree_response.success);
        let root_id = tree_response.data.unwrap()["root"]["id"].as_str().unwrap().to_string();

        let complete_response = eng.complete_tree(&CompleteTreeRequest {
            root_ids: vec![root_id],
            mode: crate::compound::CompleteMode::Cancel,
            cleanup_children: false,
            preserve_tags: vec![],
        });
        assert!(complete_response.success);
        assert!(complete_response.data.unwrap()["haltedAt"].is_null());
    }

    #[test]
    fn get_next_status_recommends_start_from_queue() {
        let mut eng = engine();
        let create = eng.manage_items(&ManageItemsRequest {
            ops: vec![ManageItemsOp::Create {
                parent_id: None,
                title: "A".into(),
                summary: String::new(),
                description: None,
                priority: None,
                complexity: None,
                requires_verification: false,
                metadata: None,
                tags: vec![],
                status_label: None,
            }],
        });
        let id = create.data.unwrap()[0]["data"]["id"].as_str().unwrap().to_string();

        let response = eng.get_next_status(&GetNextStatusRequest { item_id: id });
        assert!(response.success);
        assert_eq!(response.data.unwrap()["recommended"]["trigger"], "start");
    }
}
