//! `WorkItem`, `Role`, and `Priority`.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The coarse semantic phase of a work item. Drives gating and cascade logic.
///
/// Ordered `queue < work < review < terminal` for unblock-threshold comparisons;
/// `blocked` sits off that path and never satisfies a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Queue,
    Work,
    Review,
    Blocked,
    Terminal,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Work => "work",
            Self::Review => "review",
            Self::Blocked => "blocked",
            Self::Terminal => "terminal",
        }
    }

    /// Ordinal used for unblock-threshold comparisons. `Blocked` has no
    /// ordinal: it is never on the `queue < work < review < terminal` path.
    #[must_use]
    pub const fn order(self) -> Option<u8> {
        match self {
            Self::Queue => Some(0),
            Self::Work => Some(1),
            Self::Review => Some(2),
            Self::Terminal => Some(3),
            Self::Blocked => None,
        }
    }

    /// Whether `self` has reached at least `threshold` on the role ordering.
    #[must_use]
    pub const fn reaches(self, threshold: Self) -> bool {
        match (self.order(), threshold.order()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queue" => Ok(Self::Queue),
            "work" => Ok(Self::Work),
            "review" => Ok(Self::Review),
            "blocked" => Ok(Self::Blocked),
            "terminal" => Ok(Self::Terminal),
            other => Err(EngineError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Caller-facing priority. Ordered high > medium > low for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(EngineError::Validation(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

/// A single unit of work at any tier of a <= 3-level tree (root/child/grandchild).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub parent_id: Option<String>,
    pub depth: u8,
    pub title: String,
    pub summary: String,
    pub description: Option<String>,
    pub role: Role,
    pub status_label: Option<String>,
    pub previous_role: Option<Role>,
    pub priority: Priority,
    pub complexity: u8,
    pub requires_verification: bool,
    pub metadata: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub role_changed_at: DateTime<Utc>,
    pub version: i64,
}

impl WorkItem {
    /// The status label to show: the explicit label, else the role name.
    #[must_use]
    pub fn effective_status_label(&self) -> &str {
        self.status_label.as_deref().unwrap_or(self.role.as_str())
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Validate the invariants checkable on the value alone (depth bound,
    /// non-blank title, complexity range). Parent-existence and
    /// depth-matches-parent are storage-level invariants checked in context.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` if any invariant is violated.
    pub fn validate(&self) -> Result<()> {
        if self.depth > 2 {
            return Err(EngineError::Validation(format!(
                "depth {} exceeds maximum of 2",
                self.depth
            )));
        }
        if self.title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be blank".into()));
        }
        if !(1..=10).contains(&self.complexity) {
            return Err(EngineError::Validation(format!(
                "complexity {} out of range [1,10]",
                self.complexity
            )));
        }
        Ok(())
    }

    /// Serialize `tags` to the comma-separated bag stored in the `tags` column.
    #[must_use]
    pub fn tags_column(&self) -> String {
        self.tags.join(",")
    }

    /// Parse the comma-separated `tags` column back into a bag, dropping blanks.
    #[must_use]
    pub fn parse_tags_column(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
