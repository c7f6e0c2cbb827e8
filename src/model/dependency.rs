//! `Dependency`, the typed directed edge between two work items.

use crate::error::{EngineError, Result};
use crate::model::work_item::Role;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of relationship a dependency edge expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyType {
    Blocks,
    IsBlockedBy,
    RelatesTo,
}

impl DependencyType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "BLOCKS",
            Self::IsBlockedBy => "IS_BLOCKED_BY",
            Self::RelatesTo => "RELATES_TO",
        }
    }

    /// Whether this type participates in cycle checks and blocked computation.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        !matches!(self, Self::RelatesTo)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BLOCKS" => Ok(Self::Blocks),
            "IS_BLOCKED_BY" => Ok(Self::IsBlockedBy),
            "RELATES_TO" => Ok(Self::RelatesTo),
            other => Err(EngineError::Validation(format!(
                "unknown dependency type '{other}'"
            ))),
        }
    }
}

/// A typed directed edge `from_item_id -> to_item_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    pub from_item_id: String,
    pub to_item_id: String,
    pub dep_type: DependencyType,
    /// The role at which the blocker is deemed satisfied. Null defaults to
    /// `Terminal`. Must be `None` for `RelatesTo`.
    pub unblock_at: Option<Role>,
}

impl Dependency {
    /// The role at which this edge's blocker is considered satisfied.
    #[must_use]
    pub fn effective_unblock_at(&self) -> Role {
        self.unblock_at.unwrap_or(Role::Terminal)
    }

    /// Validate the edge-local invariants (distinct endpoints, `unblock_at`
    /// only meaningful for ordering edges). Cycle/duplicate checks require
    /// graph context and live in `depgraph`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` if an invariant is violated.
    pub fn validate(&self) -> Result<()> {
        if self.from_item_id == self.to_item_id {
            return Err(EngineError::Validation(
                "dependency endpoints must be distinct".into(),
            ));
        }
        if self.dep_type == DependencyType::RelatesTo && self.unblock_at.is_some() {
            return Err(EngineError::Validation(
                "unblock_at must be null for RELATES_TO".into(),
            ));
        }
        if let Some(role) = self.unblock_at {
            if role == Role::Blocked {
                return Err(EngineError::Validation(
                    "unblock_at may not be 'blocked'".into(),
                ));
            }
        }
        Ok(())
    }
}
