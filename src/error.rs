//! Error types for circus-progression

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProgressionError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Prerequisite '{prerequisite}' of '{figure}' would create a cycle")]
    Cycle { figure: String, prerequisite: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProgressionError {
    /// Stable tag for callers mapping errors to responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Cycle { .. } => "cycle",
            Self::Conflict(_) => "conflict",
            Self::Database(_) => "database",
            Self::Pool(_) => "pool",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Map an insert failure, turning unique violations into `Conflict`
    pub fn from_insert(err: DieselError, what: impl std::fmt::Display) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                Self::Conflict(format!("{} already exists", what))
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                Self::NotFound(format!("{} references a missing row", what))
            }
            other => Self::Database(format!("Insert failed: {}", other)),
        }
    }
}

// Lets diesel transaction closures propagate with `?`
impl From<DieselError> for ProgressionError {
    fn from(err: DieselError) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for ProgressionError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProgressionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(ProgressionError::Validation("x".into()).kind(), "validation");
        assert_eq!(
            ProgressionError::Cycle { figure: "a".into(), prerequisite: "b".into() }.kind(),
            "cycle"
        );
        assert_eq!(ProgressionError::NotFound("x".into()).kind(), "not_found");
    }

    #[test]
    fn test_not_found_insert_maps_to_database() {
        let err = ProgressionError::from_insert(DieselError::NotFound, "figure 'atr'");
        assert_eq!(err.kind(), "database");
    }
}
