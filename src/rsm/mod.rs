//! Role State Machine: the legal transition table and cascade predicates.
//!
//! Pure functions over values only — no storage access. Cascade candidates
//! need sibling counts from the store, so the workflow service pairs these
//! predicates with a `Store` lookup; this module only knows the shape of
//! "is this a cascade."

use crate::error::{EngineError, Result};
use crate::model::{Role, Trigger};
use std::collections::HashMap;

/// Resolve the destination role for `(current, trigger)`, or
/// `InvalidTransition` if the pair isn't one of the canonical rows.
/// `previous_role` is only consulted for `resume`, defaulting to `Queue`.
///
/// # Errors
///
/// Returns `EngineError::InvalidTransition` if no row matches.
pub fn resolve_transition(
    current: Role,
    trigger: Trigger,
    previous_role: Option<Role>,
) -> Result<Role> {
    let to = match (current, trigger) {
        (Role::Queue, Trigger::Start) => Role::Work,
        (Role::Work | Role::Review, Trigger::Complete) => Role::Terminal,
        (Role::Queue | Role::Work | Role::Review, Trigger::Block | Trigger::Hold) => Role::Blocked,
        (Role::Blocked, Trigger::Resume) => previous_role.unwrap_or(Role::Queue),
        (Role::Queue | Role::Work | Role::Review | Role::Blocked, Trigger::Cancel) => {
            Role::Terminal
        }
        _ => {
            return Err(EngineError::InvalidTransition {
                from: current,
                trigger: trigger.to_string(),
            });
        }
    };
    Ok(to)
}

/// Whether `(current, trigger)` is a legal row, without computing the
/// destination.
#[must_use]
pub fn is_legal(current: Role, trigger: Trigger, previous_role: Option<Role>) -> bool {
    resolve_transition(current, trigger, previous_role).is_ok()
}

/// The single legal `(trigger, resultingRole)` pair RSM would apply next if
/// the caller does nothing else — the forward edge out of the item's
/// current role that isn't `block`/`hold`. `None` once an item is terminal.
#[must_use]
pub fn next_status(current: Role, previous_role: Option<Role>) -> Option<(Trigger, Role)> {
    match current {
        Role::Queue => Some((Trigger::Start, Role::Work)),
        Role::Work | Role::Review => Some((Trigger::Complete, Role::Terminal)),
        Role::Blocked => Some((Trigger::Resume, previous_role.unwrap_or(Role::Queue))),
        Role::Terminal => None,
    }
}

/// Whether a `trigger` resulting in `to` should be considered for a parent
/// cascade at all. Only `complete`/`cancel` into `terminal`, or `start` out
/// of `queue`, ever produce a cascade candidate; `block`/`hold` never do.
#[must_use]
pub const fn may_cascade(trigger: Trigger) -> bool {
    matches!(
        trigger,
        Trigger::Complete | Trigger::Cancel | Trigger::Start
    )
}

/// `complete`/`cancel` cascade rule: the parent becomes a candidate once
/// every sibling of the transitioned child is `terminal`.
#[must_use]
pub fn all_children_terminal(role_counts: &HashMap<Role, i64>, total_children: i64) -> bool {
    total_children > 0 && role_counts.get(&Role::Terminal).copied().unwrap_or(0) == total_children
}

/// `start` cascade rule: the parent becomes a candidate when this is the
/// first child of a `queue` parent to leave `queue`.
#[must_use]
pub fn is_first_child_to_leave_queue(role_counts: &HashMap<Role, i64>, total_children: i64) -> bool {
    let in_queue = role_counts.get(&Role::Queue).copied().unwrap_or(0);
    total_children > 0 && in_queue == total_children - 1
}
