//! Error types for the automation engine
//!
//! [`RepositoryError`] covers persistence and sink failures, [`WorkflowError`]
//! is what the engine and management service return. Per-action failures
//! ([`crate::workflows::ActionError`]) never leave the executor.

use std::collections::HashMap;
use uuid::Uuid;

/// Failure reported by a repository, entity store or side-effect sink
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Execution {0} is not running")]
    InvalidTransition(Uuid),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Error surfaced by the engine and the workflow management service
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow {0} not found")]
    NotFound(Uuid),
    #[error("Validation failed: {}", format_details(.details))]
    Validation { details: HashMap<String, Vec<String>> },
    #[error("Invalid workflow definition: {0}")]
    Definition(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    /// Stable machine-readable code for the transport layer
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Definition(_) => "INVALID_DEFINITION",
            Self::Repository(_) => "DATABASE_ERROR",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

fn format_details(details: &HashMap<String, Vec<String>>) -> String {
    let mut fields: Vec<_> = details.iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    fields
        .into_iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects field-level validation errors
#[derive(Debug, Default)]
pub struct ValidationBuilder {
    details: HashMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.details
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
        self
    }

    pub fn check(self, ok: bool, field: &str, message: &str) -> Self {
        if ok { self } else { self.error(field, message) }
    }

    pub fn build(self) -> Option<WorkflowError> {
        if self.details.is_empty() {
            None
        } else {
            Some(WorkflowError::Validation {
                details: self.details,
            })
        }
    }

    /// `Ok(())` when nothing was reported
    pub fn finish(self) -> WorkflowResult<()> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_builder() {
        let error = ValidationBuilder::new()
            .error("name", "Name is required")
            .error("name", "Name must be 255 characters or less")
            .check(true, "actions", "never reported")
            .build();

        match error {
            Some(WorkflowError::Validation { details }) => {
                assert_eq!(details.get("name").unwrap().len(), 2);
                assert!(!details.contains_key("actions"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_codes() {
        let id = Uuid::new_v4();
        assert_eq!(WorkflowError::NotFound(id).error_code(), "NOT_FOUND");
        assert!(WorkflowError::NotFound(id).is_not_found());
        assert_eq!(
            WorkflowError::Definition("bad".into()).error_code(),
            "INVALID_DEFINITION"
        );
        assert_eq!(
            WorkflowError::from(RepositoryError::InvalidTransition(id)).error_code(),
            "DATABASE_ERROR"
        );
        assert!(ValidationBuilder::new().finish().is_ok());
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = ValidationBuilder::new()
            .error("name", "Name is required")
            .build()
            .unwrap();
        assert_eq!(err.to_string(), "Validation failed: name: Name is required");
    }
}
