//! Error types and handling.
//!
//! Every public service boundary returns `Result<T>` and nothing unwinds
//! across a tool call. `EngineError` is the single error currency; each
//! variant maps to exactly one external-facing error code via
//! [`EngineError::code`].

use crate::model::Role;
use serde::Serialize;
use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The taxonomy surfaced to callers in the tool response envelope's
/// `error.code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    ResourceNotFound,
    DatabaseError,
    ConflictError,
    DependencyError,
    InvalidTransition,
    GateNotSatisfied,
    DependencyBlocked,
    OperationFailed,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ConflictError => "CONFLICT_ERROR",
            Self::DependencyError => "DEPENDENCY_ERROR",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::GateNotSatisfied => "GATE_NOT_SATISFIED",
            Self::DependencyBlocked => "DEPENDENCY_BLOCKED",
            Self::OperationFailed => "OPERATION_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("version conflict on {id}: expected {expected}, current {current}")]
    Conflict {
        id: String,
        expected: i64,
        current: i64,
    },

    #[error("dependency error: {0}")]
    Dependency(String),

    #[error("duplicate dependency ({from}, {to}, {dep_type})")]
    DuplicateDependency {
        from: String,
        to: String,
        dep_type: String,
    },

    #[error("invalid transition: role '{from}' has no '{trigger}' edge")]
    InvalidTransition { from: Role, trigger: String },

    #[error("gate not satisfied: missing notes {missing:?}")]
    GateNotSatisfied { missing: Vec<String> },

    #[error("blocked by: {blockers:?}")]
    DependencyBlocked { blockers: Vec<String> },

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) | Self::Config(_) => ErrorCode::ValidationError,
            Self::NotFound { .. } => ErrorCode::ResourceNotFound,
            Self::Conflict { .. } => ErrorCode::ConflictError,
            Self::Dependency(_) => ErrorCode::DependencyError,
            Self::DuplicateDependency { .. } => ErrorCode::ConflictError,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::GateNotSatisfied { .. } => ErrorCode::GateNotSatisfied,
            Self::DependencyBlocked { .. } => ErrorCode::DependencyBlocked,
            Self::OperationFailed(_) => ErrorCode::OperationFailed,
            Self::Database(_) | Self::Io(_) => ErrorCode::DatabaseError,
            Self::Serialization(_) | Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    #[must_use]
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }
}
