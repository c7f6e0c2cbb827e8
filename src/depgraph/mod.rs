//! Dependency Graph: cycle-safe edge insertion and blocked/unblock queries.
//!
//! Works over an in-memory snapshot of [`Dependency`] rows fetched from the
//! store for the call's lifetime; the engine holds no cache across calls.

use crate::error::{EngineError, Result};
use crate::model::{Dependency, DependencyType, Role};
use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    From,
    To,
}

/// Normalize an edge to a single `blocker -> blocked` direction, ignoring
/// `RelatesTo` (it never participates in cycle or blocked-status checks).
fn as_blocks_edge(dep: &Dependency) -> Option<(&str, &str, Role)> {
    match dep.dep_type {
        DependencyType::Blocks => Some((&dep.from_item_id, &dep.to_item_id, dep.effective_unblock_at())),
        DependencyType::IsBlockedBy => Some((&dep.to_item_id, &dep.from_item_id, dep.effective_unblock_at())),
        DependencyType::RelatesTo => None,
    }
}

/// Check whether inserting `candidates` alongside `existing` edges would
/// introduce a cycle in the combined "blocks" relation. Candidates are
/// folded in with existing edges before the check, so a cycle formed only
/// within the batch is caught.
///
/// # Errors
///
/// Returns `EngineError::Validation` naming the cyclic item ids.
pub fn check_acyclic(existing: &[Dependency], candidates: &[Dependency]) -> Result<()> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for dep in existing.iter().chain(candidates) {
        if let Some((blocker, blocked, _)) = as_blocks_edge(dep) {
            adjacency.entry(blocker).or_default().push(blocked);
        }
    }

    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();
    let mut path = Vec::new();

    for &node in adjacency.keys() {
        if !visited.contains(node) {
            if let Some(cycle) =
                dfs_find_cycle(node, &adjacency, &mut visited, &mut in_stack, &mut path)
            {
                return Err(EngineError::Validation(format!(
                    "cycle involving {}",
                    cycle.join(",")
                )));
            }
        }
    }
    Ok(())
}

fn dfs_find_cycle<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    in_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    in_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = adjacency.get(node) {
        for &next in neighbors {
            if in_stack.contains(next) {
                let start = path.iter().position(|&n| n == next).unwrap_or(0);
                return Some(path[start..].iter().map(ToString::to_string).collect());
            }
            if !visited.contains(next) {
                if let Some(cycle) = dfs_find_cycle(next, adjacency, visited, in_stack, path) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    in_stack.remove(node);
    None
}

/// Single-hop neighbor lookup by direction.
#[must_use]
pub fn neighbors<'a>(edges: &'a [Dependency], item_id: &str, direction: Direction) -> Vec<&'a Dependency> {
    edges
        .iter()
        .filter(|d| match direction {
            Direction::From => d.from_item_id == item_id,
            Direction::To => d.to_item_id == item_id,
        })
        .collect()
}

/// Full graph traversal: BFS from `seed` over both `from`/`to` neighbors
/// (any dependency type), bounded to `max_depth` hops. Returns visited ids
/// excluding the seed, in discovery order.
#[must_use]
pub fn bfs(edges: &[Dependency], seed: &str, max_depth: u32) -> Vec<String> {
    let mut visited = HashSet::new();
    visited.insert(seed.to_string());
    let mut order = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back((seed.to_string(), 0u32));

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for dep in edges {
            let next = if dep.from_item_id == current {
                Some(dep.to_item_id.clone())
            } else if dep.to_item_id == current {
                Some(dep.from_item_id.clone())
            } else {
                None
            };
            if let Some(next) = next {
                if visited.insert(next.clone()) {
                    order.push(next.clone());
                    queue.push_back((next, depth + 1));
                }
            }
        }
    }
    order
}

/// Blocker ids (and their unblock threshold) for `item_id`'s ordering
/// edges, regardless of whether the threshold is currently satisfied.
#[must_use]
pub fn declared_blockers(edges: &[Dependency], item_id: &str) -> Vec<(String, Role)> {
    edges
        .iter()
        .filter_map(as_blocks_edge)
        .filter(|(_, blocked, _)| *blocked == item_id)
        .map(|(blocker, _, threshold)| (blocker.to_string(), threshold))
        .collect()
}

/// Blocker ids for `item_id` whose role has not yet reached the edge's
/// `unblockAt` threshold. Empty means the item is not currently blocked.
#[must_use]
pub fn unsatisfied_blockers(
    edges: &[Dependency],
    item_id: &str,
    role_of: &dyn Fn(&str) -> Option<Role>,
) -> Vec<String> {
    declared_blockers(edges, item_id)
        .into_iter()
        .filter(|(blocker_id, threshold)| {
            role_of(blocker_id).is_none_or(|role| !role.reaches(*threshold))
        })
        .map(|(blocker_id, _)| blocker_id)
        .collect()
}

#[must_use]
pub fn is_blocked(edges: &[Dependency], item_id: &str, role_of: &dyn Fn(&str) -> Option<Role>) -> bool {
    !unsatisfied_blockers(edges, item_id, role_of).is_empty()
}

/// Dependents that become fully unblocked as a result of `changed_item_id`'s
/// role change, given the post-change `role_of` lookup. Called once per
/// role change; a dependent is "newly unblocked" if it has no remaining
/// unsatisfied blocker at all.
#[must_use]
pub fn newly_unblocked(
    edges: &[Dependency],
    changed_item_id: &str,
    role_of: &dyn Fn(&str) -> Option<Role>,
) -> Vec<String> {
    let dependents: HashSet<&str> = edges
        .iter()
        .filter_map(as_blocks_edge)
        .filter(|(blocker, _, _)| *blocker == changed_item_id)
        .map(|(_, blocked, _)| blocked)
        .collect();

    dependents
        .into_iter()
        .filter(|dependent| !is_blocked(edges, dependent, role_of))
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(id: &str, from: &str, to: &str, ty: DependencyType) -> Dependency {
        Dependency {
            id: id.to_string(),
            from_item_id: from.to_string(),
            to_item_id: to.to_string(),
            dep_type: ty,
            unblock_at: None,
        }
    }

    #[test]
    fn accepts_acyclic_batch() {
        let existing = vec![];
        let candidates = vec![
            dep("d1", "a", "b", DependencyType::Blocks),
            dep("d2", "b", "c", DependencyType::Blocks),
        ];
        assert!(check_acyclic(&existing, &candidates).is_ok());
    }

    #[test]
    fn rejects_cycle_formed_by_batch() {
        let existing = vec![];
        let candidates = vec![
            dep("d1", "a", "b", DependencyType::Blocks),
            dep("d2", "b", "c", DependencyType::Blocks),
            dep("d3", "c", "a", DependencyType::Blocks),
        ];
        let err = check_acyclic(&existing, &candidates).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn is_blocked_ignores_relates_to() {
        let edges = vec![dep("d1", "a", "b", DependencyType::RelatesTo)];
        assert!(!is_blocked(&edges, "b", &|_| Some(Role::Queue)));
    }

    #[test]
    fn blocked_until_threshold_reached() {
        let mut d = dep("d1", "a", "b", DependencyType::Blocks);
        d.unblock_at = Some(Role::Terminal);
        let edges = vec![d];
        assert!(is_blocked(&edges, "b", &|_| Some(Role::Work)));
        assert!(!is_blocked(&edges, "b", &|_| Some(Role::Terminal)));
    }

    #[test]
    fn is_blocked_by_direction_treated_as_reverse_blocks() {
        let mut d = dep("d1", "a", "b", DependencyType::IsBlockedBy);
        d.unblock_at = Some(Role::Terminal);
        let edges = vec![d];
        // a IS_BLOCKED_BY b means b blocks a.
        assert!(is_blocked(&edges, "a", &|_| Some(Role::Work)));
        assert!(!is_blocked(&edges, "a", &|_| Some(Role::Terminal)));
    }

    #[test]
    fn newly_unblocked_reports_dependent_with_single_satisfied_blocker() {
        let mut d = dep("d1", "a", "b", DependencyType::Blocks);
        d.unblock_at = Some(Role::Terminal);
        let edges = vec![d];
        let result = newly_unblocked(&edges, "a", &|_| Some(Role::Terminal));
        assert_eq!(result, vec!["b".to_string()]);
    }

    #[test]
    fn newly_unblocked_empty_when_other_blocker_still_unsatisfied() {
        let mut d1 = dep("d1", "a", "c", DependencyType::Blocks);
        d1.unblock_at = Some(Role::Terminal);
        let mut d2 = dep("d2", "b", "c", DependencyType::Blocks);
        d2.unblock_at = Some(Role::Terminal);
        let edges = vec![d1, d2];
        let role_of = |id: &str| -> Option<Role> {
            match id {
                "a" => Some(Role::Terminal),
                "b" => Some(Role::Work),
                _ => None,
            }
        };
        assert!(newly_unblocked(&edges, "a", &role_of).is_empty());
    }
}
