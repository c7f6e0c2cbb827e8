//! `RoleTransition` audit row, `Trigger`, and `EntityType`.

use crate::error::{EngineError, Result};
use crate::model::work_item::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The verb that requests a role transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Start,
    Complete,
    Block,
    Hold,
    Resume,
    Cancel,
}

impl Trigger {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Block => "block",
            Self::Hold => "hold",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Self::Start),
            "complete" => Ok(Self::Complete),
            "block" => Ok(Self::Block),
            "hold" => Ok(Self::Hold),
            "resume" => Ok(Self::Resume),
            "cancel" => Ok(Self::Cancel),
            other => Err(EngineError::Validation(format!(
                "unknown trigger '{other}'"
            ))),
        }
    }
}

/// The historical name for a work item tier; retained only for the audit
/// trail's `entity_type` column (classic callers still think in these terms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Feature,
    Project,
    Item,
}

impl EntityType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Feature => "feature",
            Self::Project => "project",
            Self::Item => "item",
        }
    }

    /// Classic naming by depth: root = project, child = feature, grandchild = task.
    #[must_use]
    pub const fn from_depth(depth: u8) -> Self {
        match depth {
            0 => Self::Project,
            1 => Self::Feature,
            _ => Self::Task,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "task" => Ok(Self::Task),
            "feature" => Ok(Self::Feature),
            "project" => Ok(Self::Project),
            "item" => Ok(Self::Item),
            other => Err(EngineError::Validation(format!(
                "unknown entity type '{other}'"
            ))),
        }
    }
}

/// Immutable history row written once per successful `advance_item`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTransition {
    pub id: i64,
    pub entity_id: String,
    pub entity_type: EntityType,
    pub from_role: Role,
    pub to_role: Role,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub transitioned_at: DateTime<Utc>,
    pub trigger: Trigger,
    pub summary: Option<String>,
}
