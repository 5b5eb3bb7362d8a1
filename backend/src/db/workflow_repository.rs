use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resolve_shared::{ExecutionStatus, NewWorkflow, TriggerType, Workflow, WorkflowExecution, WorkflowUpdate};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RepositoryResult;

/// Filter for listing workflows. Soft-deleted rows are always excluded.
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub trigger: Option<TriggerType>,
    pub is_active: Option<bool>,
}

impl WorkflowFilter {
    /// Workflows the dispatcher may run for `trigger`
    pub fn dispatchable(trigger: TriggerType) -> Self {
        Self {
            trigger: Some(trigger),
            is_active: Some(true),
        }
    }

    pub fn matches(&self, workflow: &Workflow) -> bool {
        !workflow.is_deleted()
            && self.trigger.is_none_or(|t| t == workflow.trigger)
            && self.is_active.is_none_or(|a| a == workflow.is_active)
    }
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create_workflow(&self, workflow: &NewWorkflow) -> RepositoryResult<Workflow>;

    /// Oldest first
    async fn find_workflows(&self, filter: &WorkflowFilter) -> RepositoryResult<Vec<Workflow>>;

    /// `None` for unknown and soft-deleted ids
    async fn find_workflow_by_id(&self, workflow_id: Uuid) -> RepositoryResult<Option<Workflow>>;

    async fn update_workflow(
        &self,
        workflow_id: Uuid,
        update: &WorkflowUpdate,
    ) -> RepositoryResult<Option<Workflow>>;

    /// Returns false when there was no live row to delete
    async fn soft_delete_workflow(&self, workflow_id: Uuid) -> RepositoryResult<bool>;
}

/// Terminal write applied to a running execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionCompletion {
    pub status: ExecutionStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create_execution(&self, execution: &WorkflowExecution) -> RepositoryResult<()>;

    /// Single guarded update; fails with `InvalidTransition` unless the
    /// execution is still `RUNNING`
    async fn complete_execution(
        &self,
        execution_id: Uuid,
        completion: &ExecutionCompletion,
    ) -> RepositoryResult<()>;

    async fn find_execution_by_id(
        &self,
        execution_id: Uuid,
    ) -> RepositoryResult<Option<WorkflowExecution>>;

    /// Newest first, together with the total row count for the filter
    async fn list_executions(
        &self,
        workflow_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<(Vec<WorkflowExecution>, i64)>;

    /// Newest first
    async fn recent_executions(
        &self,
        workflow_id: Uuid,
        limit: i64,
    ) -> RepositoryResult<Vec<WorkflowExecution>>;
}
