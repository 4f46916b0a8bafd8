use sea_orm::error::DbErr;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// A single violated field on a rejected record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: &'static str,
    pub message: String,
}

/// Collection of per-field validation failures.
///
/// All rules for a record are evaluated before the result is reported, so a
/// caller sees every problem with one request rather than the first one hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationIssues {
    pub issues: Vec<FieldIssue>,
}

impl ValidationIssues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.issues.push(FieldIssue {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns `Err(ServiceError::ValidationError)` if any issue was recorded.
    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ValidationError(self))
        }
    }

    pub fn field(&self, field: &str) -> Option<&FieldIssue> {
        self.issues.iter().find(|i| i.field == field)
    }
}

impl fmt::Display for ValidationIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for issue in &self.issues {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", issue.field, issue.message)?;
            first = false;
        }
        Ok(())
    }
}

/// Errors surfaced by the build-order services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(ValidationIssues),

    #[error("Insufficient stock for item {stock_item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        stock_item_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// Maps an insert failure to `Conflict` when the store reports a
    /// uniqueness violation, so concurrent duplicate allocations surface as a
    /// local validation failure rather than a bare database error.
    pub fn insert_error(err: DbErr, what: &str) -> Self {
        match err.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::Conflict(format!("{} already exists", what))
            }
            _ => ServiceError::DatabaseError(err),
        }
    }
}
