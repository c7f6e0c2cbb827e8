//! `Note`, a structured text attachment on a work item keyed by schema name.

use crate::model::work_item::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A note attached to a work item. `(item_id, key)` is unique; upserts match
/// on this pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub item_id: String,
    pub key: String,
    /// The phase in which the note is required/expected.
    pub role: Role,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Note {
    #[must_use]
    pub fn is_filled(&self) -> bool {
        !self.body.trim().is_empty()
    }
}
