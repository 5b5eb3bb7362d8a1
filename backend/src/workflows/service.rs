// Workflow Service - Authoring, lifecycle and history operations for callers

use resolve_shared::{NewWorkflow, TriggerType, Workflow, WorkflowExecution, WorkflowUpdate};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::engine::{DispatchOutcome, ExecutionOutcome, Stores, WorkflowEngine};
use crate::config::AutomationConfig;
use crate::db::{ExecutionRepository, WorkflowFilter, WorkflowRepository};
use crate::error::{ValidationBuilder, WorkflowError, WorkflowResult};
use crate::pagination::{MAX_PAGE_SIZE, PaginatedResponse, PaginationParams};

pub const MAX_NAME_LENGTH: usize = 255;

#[derive(Clone)]
pub struct WorkflowService {
    workflows: Arc<dyn WorkflowRepository>,
    executions: Arc<dyn ExecutionRepository>,
    engine: WorkflowEngine,
    history_page_size: i64,
}

impl WorkflowService {
    pub fn new(stores: Stores, config: AutomationConfig) -> Self {
        Self {
            workflows: stores.workflows.clone(),
            executions: stores.executions.clone(),
            history_page_size: config.history_page_size,
            engine: WorkflowEngine::new(stores, config),
        }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub async fn create(&self, workflow: &NewWorkflow) -> WorkflowResult<Workflow> {
        let workflow = NewWorkflow {
            name: normalize_name(&workflow.name)?,
            ..workflow.clone()
        };

        let created = self.workflows.create_workflow(&workflow).await?;
        info!("Created workflow {} ({}) on {}", created.id, created.name, created.trigger);
        Ok(created)
    }

    pub async fn list(&self, filter: &WorkflowFilter) -> WorkflowResult<Vec<Workflow>> {
        Ok(self.workflows.find_workflows(filter).await?)
    }

    pub async fn get(&self, workflow_id: Uuid) -> WorkflowResult<Workflow> {
        self.workflows
            .find_workflow_by_id(workflow_id)
            .await?
            .ok_or(WorkflowError::NotFound(workflow_id))
    }

    /// Partial update; conditions and actions are replaced wholesale
    pub async fn update(&self, workflow_id: Uuid, update: &WorkflowUpdate) -> WorkflowResult<Workflow> {
        let update = WorkflowUpdate {
            name: update.name.as_deref().map(normalize_name).transpose()?,
            ..update.clone()
        };

        self.workflows
            .update_workflow(workflow_id, &update)
            .await?
            .ok_or(WorkflowError::NotFound(workflow_id))
    }

    /// Soft delete; the workflow disappears from reads and dispatch
    pub async fn delete(&self, workflow_id: Uuid) -> WorkflowResult<()> {
        if !self.workflows.soft_delete_workflow(workflow_id).await? {
            return Err(WorkflowError::NotFound(workflow_id));
        }
        info!("Deleted workflow {}", workflow_id);
        Ok(())
    }

    pub async fn toggle(&self, workflow_id: Uuid, is_active: bool) -> WorkflowResult<Workflow> {
        let update = WorkflowUpdate {
            is_active: Some(is_active),
            ..Default::default()
        };
        self.update(workflow_id, &update).await
    }

    /// Manual run of one workflow with an arbitrary payload
    pub async fn execute(&self, workflow_id: Uuid, payload: &Value) -> WorkflowResult<ExecutionOutcome> {
        self.engine.execute_workflow(workflow_id, payload).await
    }

    pub async fn dispatch(&self, trigger: TriggerType, payload: &Value) -> WorkflowResult<Vec<DispatchOutcome>> {
        self.engine.dispatch_for_trigger(trigger, payload).await
    }

    /// Execution history, newest first. `params` defaults to the first page
    /// with the configured page size.
    pub async fn executions(
        &self,
        workflow_id: Option<Uuid>,
        params: Option<PaginationParams>,
    ) -> WorkflowResult<PaginatedResponse<WorkflowExecution>> {
        if let Some(id) = workflow_id {
            self.get(id).await?;
        }

        let params = params.unwrap_or_else(|| PaginationParams::new(1, self.history_page_size));
        let (executions, total) = self
            .executions
            .list_executions(workflow_id, params.limit(), params.offset())
            .await?;

        Ok(PaginatedResponse::new(executions, &params, total))
    }

    pub async fn recent_executions(&self, workflow_id: Uuid, limit: i64) -> WorkflowResult<Vec<WorkflowExecution>> {
        self.get(workflow_id).await?;

        Ok(self
            .executions
            .recent_executions(workflow_id, limit.clamp(1, MAX_PAGE_SIZE))
            .await?)
    }
}

/// Trimmed name, or a validation error
fn normalize_name(name: &str) -> WorkflowResult<String> {
    let trimmed = name.trim();

    ValidationBuilder::new()
        .check(!trimmed.is_empty(), "name", "Name is required")
        .check(
            trimmed.chars().count() <= MAX_NAME_LENGTH,
            "name",
            "Name must be 255 characters or less",
        )
        .finish()?;

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Welcome sequence").unwrap(), "Welcome sequence");
        assert_eq!(normalize_name("  Welcome sequence \n").unwrap(), "Welcome sequence");
        assert!(normalize_name(&"é".repeat(255)).is_ok());
        assert!(normalize_name(&format!("  {}  ", "x".repeat(255))).is_ok());

        let long = "x".repeat(256);
        for bad in ["", "   ", long.as_str()] {
            match normalize_name(bad) {
                Err(WorkflowError::Validation { details }) => assert!(details.contains_key("name")),
                other => panic!("expected validation error for {:?}, got {:?}", bad, other),
            }
        }
    }
}
