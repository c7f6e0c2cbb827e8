//! Gate Evaluator: decides whether an item's required notes admit a
//! transition into a given role.

use crate::config::NoteSchema;
use crate::config::note_schema::NoteSchemaEntry;
use crate::model::{Note, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Open,
    Closed,
}

/// Result of evaluating an item's note schema against its current notes for
/// a proposed transition into `incoming_role`.
#[derive(Debug, Clone, PartialEq)]
pub struct GateResult {
    pub expected_notes: Vec<NoteSchemaEntry>,
    pub missing_required: Vec<String>,
    pub status: GateStatus,
}

impl GateResult {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, GateStatus::Open)
    }
}

/// Evaluate the gate for an item carrying `tags`, about to move into
/// `incoming_role`, given its current `notes`. A required entry only gates
/// when its `role` matches the incoming role — a `work`-role requirement
/// does not block entry into `review`.
#[must_use]
pub fn evaluate(schema: &NoteSchema, tags: &[String], incoming_role: Role, notes: &[Note]) -> GateResult {
    let expected_notes = schema.expected_for_tags(tags);

    let missing_required: Vec<String> = expected_notes
        .iter()
        .filter(|entry| entry.required && entry.role == incoming_role)
        .filter(|entry| !note_is_filled(notes, &entry.key))
        .map(|entry| entry.key.clone())
        .collect();

    let status = if missing_required.is_empty() {
        GateStatus::Open
    } else {
        GateStatus::Closed
    };

    GateResult {
        expected_notes,
        missing_required,
        status,
    }
}

fn note_is_filled(notes: &[Note], key: &str) -> bool {
    notes.iter().any(|n| n.key == key && n.is_filled())
}
