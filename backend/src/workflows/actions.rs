// Workflow Actions - Per-action outcome records and failure types

use resolve_shared::ActionType;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use uuid::Uuid;

use crate::db::EntityKind;
use crate::error::RepositoryError;

pub const NO_ENTITY_ID: &str = "No entity ID provided";
pub const NO_TEAM_ID: &str = "No team ID provided";
pub const TEAM_MANAGER_NOT_FOUND: &str = "Team manager not found";

/// A handler failure. Recorded against the action, never raised past the
/// executor.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Missing required config '{0}'")]
    MissingConfig(&'static str),
    #[error("Invalid config '{key}': {reason}")]
    InvalidConfig { key: &'static str, reason: String },
    #[error("Field '{field}' is not updatable on {kind}")]
    FieldNotUpdatable { field: String, kind: EntityKind },
    #[error("{kind} {id} not found")]
    EntityNotFound { kind: EntityKind, id: Uuid },
    #[error("Action timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

pub type ActionResult<T> = Result<T, ActionError>;

/// Result of one action within an execution, as stored in
/// `result.actionResults`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub action: ActionType,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: i64,
}

impl ActionOutcome {
    pub fn success(action: ActionType, result: Value) -> Self {
        Self {
            action,
            success: true,
            result: Some(result),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failure(action: ActionType, error: &str) -> Self {
        Self {
            action,
            success: false,
            result: None,
            error: Some(error.to_string()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Handler returned a structured `{error}` result instead of failing
    pub fn soft_error(&self) -> Option<&str> {
        self.result.as_ref()?.get("error")?.as_str()
    }
}

/// Structured error result that keeps the action successful
pub fn soft_error(message: &str) -> Value {
    json!({ "error": message })
}

pub fn not_implemented(action_type: &ActionType) -> Value {
    json!({ "message": format!("Action type {} not implemented", action_type) })
}
