//! Quantified invariants over the role state machine, the dependency graph,
//! and the note gate, checked against randomly generated inputs rather than
//! hand-picked examples.

mod common;

use proptest::prelude::*;
use std::collections::HashMap;
use workitem_engine::depgraph;
use workitem_engine::gate;
use workitem_engine::model::{Dependency, DependencyType, Note, Role, Trigger};
use workitem_engine::rsm;

fn any_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::Queue),
        Just(Role::Work),
        Just(Role::Review),
        Just(Role::Blocked),
        Just(Role::Terminal),
    ]
}

fn any_trigger() -> impl Strategy<Value = Trigger> {
    prop_oneof![
        Just(Trigger::Start),
        Just(Trigger::Complete),
        Just(Trigger::Block),
        Just(Trigger::Hold),
        Just(Trigger::Resume),
        Just(Trigger::Cancel),
    ]
}

fn legal_table_row(current: Role, trigger: Trigger, previous_role: Option<Role>) -> Option<Role> {
    match (current, trigger) {
        (Role::Queue, Trigger::Start) => Some(Role::Work),
        (Role::Work | Role::Review, Trigger::Complete) => Some(Role::Terminal),
        (Role::Queue | Role::Work | Role::Review, Trigger::Block | Trigger::Hold) => Some(Role::Blocked),
        (Role::Blocked, Trigger::Resume) => Some(previous_role.unwrap_or(Role::Queue)),
        (Role::Queue | Role::Work | Role::Review | Role::Blocked, Trigger::Cancel) => Some(Role::Terminal),
        _ => None,
    }
}

proptest! {
    /// Every `(role, trigger)` pair either matches the hand-written legality
    /// table exactly, or is rejected - there is no third outcome, and
    /// `is_legal` never disagrees with `resolve_transition`.
    #[test]
    fn rsm_matches_hand_written_table(
        current in any_role(),
        trigger in any_trigger(),
        previous in proptest::option::of(any_role()),
    ) {
        let expected = legal_table_row(current, trigger, previous);
        let actual = rsm::resolve_transition(current, trigger, previous);

        match expected {
            Some(expected_role) => {
                prop_assert_eq!(actual.ok(), Some(expected_role));
                prop_assert!(rsm::is_legal(current, trigger, previous));
            }
            None => {
                prop_assert!(actual.is_err());
                prop_assert!(!rsm::is_legal(current, trigger, previous));
            }
        }
    }

    /// `next_status` only ever names a transition that `is_legal` also
    /// accepts - the "what happens if nothing else happens" recommendation
    /// can never itself be an illegal move.
    #[test]
    fn next_status_is_always_itself_legal(current in any_role(), previous in proptest::option::of(any_role())) {
        if let Some((trigger, _)) = rsm::next_status(current, previous) {
            prop_assert!(rsm::is_legal(current, trigger, previous));
        }
    }

    /// Any batch of `BLOCKS`/`IS_BLOCKED_BY` edges over a small id alphabet
    /// that forms a true cycle in the folded blocker graph is rejected by
    /// `check_acyclic`, and any batch whose folded graph is a DAG is
    /// accepted - checked by comparing against a brute-force reachability
    /// search over the same edge set.
    #[test]
    fn acyclicity_matches_brute_force_reachability(
        edges in proptest::collection::vec(
            (0usize..5, 0usize..5, proptest::bool::ANY),
            0..8,
        ),
    ) {
        let ids = ["a", "b", "c", "d", "e"];
        let deps: Vec<Dependency> = edges
            .iter()
            .enumerate()
            .filter(|(_, (from, to, _))| from != to)
            .map(|(i, &(from, to, is_blocks))| Dependency {
                id: format!("d{i}"),
                from_item_id: ids[from].to_string(),
                to_item_id: ids[to].to_string(),
                dep_type: if is_blocks { DependencyType::Blocks } else { DependencyType::IsBlockedBy },
                unblock_at: None,
            })
            .collect();

        // Fold to the same blocker -> blocked adjacency `check_acyclic` uses.
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for dep in &deps {
            let (blocker, blocked) = match dep.dep_type {
                DependencyType::Blocks => (dep.from_item_id.as_str(), dep.to_item_id.as_str()),
                DependencyType::IsBlockedBy => (dep.to_item_id.as_str(), dep.from_item_id.as_str()),
                DependencyType::RelatesTo => continue,
            };
            adjacency.entry(blocker).or_default().push(blocked);
        }

        let has_cycle = ids.iter().any(|&start| {
            let mut stack = vec![start];
            let mut visited = std::collections::HashSet::new();
            while let Some(node) = stack.pop() {
                if node == start && visited.contains(node) {
                    return true;
                }
                if !visited.insert(node) {
                    continue;
                }
                if let Some(next) = adjacency.get(node) {
                    stack.extend(next.iter().filter(|&&n| n == start || !visited.contains(n)));
                }
            }
            false
        });

        let result = depgraph::check_acyclic(&[], &deps);
        prop_assert_eq!(result.is_err(), has_cycle);
    }

    /// A filled note for the exact incoming role always opens the gate for
    /// that key, regardless of what other tags/notes are present - adding
    /// unrelated notes never closes a gate that a matching one already
    /// opened.
    #[test]
    fn gate_monotonic_in_matching_filled_notes(
        role in any_role(),
        body in "[a-z ]{1,20}",
        extra_key in "[a-z]{1,8}",
    ) {
        let schema_yaml = format!("t:\n  - key: k\n    role: {}\n    required: true\n", role.as_str());
        let schema: workitem_engine::config::NoteSchema = serde_yaml::from_str(&schema_yaml).unwrap();
        let tags = vec!["t".to_string()];

        let now = chrono::Utc::now();
        let filled = Note {
            id: "n1".into(),
            item_id: "x".into(),
            key: "k".into(),
            role,
            body,
            created_at: now,
            modified_at: now,
        };
        let result_without_extra = gate::evaluate(&schema, &tags, role, &[filled.clone()]);
        prop_assert!(result_without_extra.is_open());

        let unrelated = Note {
            id: "n2".into(),
            item_id: "x".into(),
            key: extra_key,
            role,
            body: String::new(),
            created_at: now,
            modified_at: now,
        };
        let result_with_extra = gate::evaluate(&schema, &tags, role, &[filled, unrelated]);
        prop_assert!(result_with_extra.is_open());
    }

    /// A required note gates only when its schema-declared role matches the
    /// role being entered - a requirement scoped to some other role never
    /// blocks this one.
    #[test]
    fn gate_ignores_requirements_scoped_to_a_different_role(
        declared_role in any_role(),
        incoming_role in any_role(),
    ) {
        prop_assume!(declared_role != incoming_role);
        let schema_yaml = format!("t:\n  - key: k\n    role: {}\n    required: true\n", declared_role.as_str());
        let schema: workitem_engine::config::NoteSchema = serde_yaml::from_str(&schema_yaml).unwrap();
        let result = gate::evaluate(&schema, &["t".to_string()], incoming_role, &[]);
        prop_assert!(result.is_open());
    }
}
