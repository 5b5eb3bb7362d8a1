use async_trait::async_trait;
use chrono::{DateTime, Utc};
use resolve_shared::{NewWorkflow, Workflow, WorkflowExecution, WorkflowUpdate};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::workflow_repository::{
    ExecutionCompletion, ExecutionRepository, WorkflowFilter, WorkflowRepository,
};
use crate::error::{RepositoryError, RepositoryResult};

const WORKFLOW_COLUMNS: &str = "id, name, description, is_active, trigger, trigger_data, \
     conditions, actions, created_by, created_at, updated_at, deleted_at";

const EXECUTION_COLUMNS: &str =
    "id, workflow_id, trigger_data, status, started_at, completed_at, duration_ms, result, error";

/// PostgreSQL-backed workflow and execution store
#[derive(Clone)]
pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    is_active: bool,
    trigger: String,
    trigger_data: Option<Value>,
    conditions: Value,
    actions: Value,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkflowRow> for Workflow {
    type Error = RepositoryError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        let trigger = row.trigger.parse().map_err(|e| {
            RepositoryError::Corrupt(format!("workflow {}: {}", row.id, e))
        })?;

        Ok(Workflow {
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            trigger,
            trigger_data: row.trigger_data,
            conditions: row.conditions,
            actions: row.actions,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: Uuid,
    workflow_id: Uuid,
    trigger_data: Value,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    result: Option<Value>,
    error: Option<String>,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = RepositoryError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e| {
            RepositoryError::Corrupt(format!("execution {}: {}", row.id, e))
        })?;

        Ok(WorkflowExecution {
            id: row.id,
            workflow_id: row.workflow_id,
            trigger_data: row.trigger_data,
            status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
            result: row.result,
            error: row.error,
        })
    }
}

fn into_workflows(rows: Vec<WorkflowRow>) -> RepositoryResult<Vec<Workflow>> {
    rows.into_iter().map(Workflow::try_from).collect()
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn create_workflow(&self, workflow: &NewWorkflow) -> RepositoryResult<Workflow> {
        let conditions = serde_json::to_value(&workflow.conditions)?;
        let actions = serde_json::to_value(&workflow.actions)?;

        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            r#"
            INSERT INTO workflows (
                id, name, description, is_active, trigger, trigger_data,
                conditions, actions, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            RETURNING {WORKFLOW_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(workflow.trigger.as_str())
        .bind(&workflow.trigger_data)
        .bind(conditions)
        .bind(actions)
        .bind(workflow.created_by)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_workflows(&self, filter: &WorkflowFilter) -> RepositoryResult<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            r#"
            SELECT {WORKFLOW_COLUMNS}
            FROM workflows
            WHERE deleted_at IS NULL
              AND ($1::text IS NULL OR trigger = $1)
              AND ($2::bool IS NULL OR is_active = $2)
            ORDER BY created_at ASC
            "#
        ))
        .bind(filter.trigger.map(|t| t.as_str()))
        .bind(filter.is_active)
        .fetch_all(&self.pool)
        .await?;

        into_workflows(rows)
    }

    async fn find_workflow_by_id(&self, workflow_id: Uuid) -> RepositoryResult<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Workflow::try_from).transpose()
    }

    async fn update_workflow(
        &self,
        workflow_id: Uuid,
        update: &WorkflowUpdate,
    ) -> RepositoryResult<Option<Workflow>> {
        let conditions = update
            .conditions
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let actions = update
            .actions
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            r#"
            UPDATE workflows SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                trigger = COALESCE($4, trigger),
                trigger_data = COALESCE($5, trigger_data),
                is_active = COALESCE($6, is_active),
                conditions = COALESCE($7, conditions),
                actions = COALESCE($8, actions),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {WORKFLOW_COLUMNS}
            "#
        ))
        .bind(workflow_id)
        .bind(update.name.as_deref())
        .bind(&update.description)
        .bind(update.trigger.map(|t| t.as_str()))
        .bind(&update.trigger_data)
        .bind(update.is_active)
        .bind(conditions)
        .bind(actions)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Workflow::try_from).transpose()
    }

    async fn soft_delete_workflow(&self, workflow_id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE workflows SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ExecutionRepository for PostgresWorkflowRepository {
    async fn create_execution(&self, execution: &WorkflowExecution) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                id, workflow_id, trigger_data, status, started_at,
                completed_at, duration_ms, result, error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(execution.id)
        .bind(execution.workflow_id)
        .bind(&execution.trigger_data)
        .bind(execution.status.as_str())
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.duration_ms)
        .bind(&execution.result)
        .bind(&execution.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_execution(
        &self,
        execution_id: Uuid,
        completion: &ExecutionCompletion,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions SET
                status = $2,
                completed_at = $3,
                duration_ms = $4,
                result = $5,
                error = $6
            WHERE id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(execution_id)
        .bind(completion.status.as_str())
        .bind(completion.completed_at)
        .bind(completion.duration_ms)
        .bind(&completion.result)
        .bind(&completion.error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::InvalidTransition(execution_id));
        }
        Ok(())
    }

    async fn find_execution_by_id(
        &self,
        execution_id: Uuid,
    ) -> RepositoryResult<Option<WorkflowExecution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = $1"
        ))
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowExecution::try_from).transpose()
    }

    async fn list_executions(
        &self,
        workflow_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<(Vec<WorkflowExecution>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_executions WHERE ($1::uuid IS NULL OR workflow_id = $1)",
        )
        .bind(workflow_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            r#"
            SELECT {EXECUTION_COLUMNS}
            FROM workflow_executions
            WHERE ($1::uuid IS NULL OR workflow_id = $1)
            ORDER BY started_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(workflow_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let executions = rows
            .into_iter()
            .map(WorkflowExecution::try_from)
            .collect::<RepositoryResult<Vec<_>>>()?;

        Ok((executions, total))
    }

    async fn recent_executions(
        &self,
        workflow_id: Uuid,
        limit: i64,
    ) -> RepositoryResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            r#"
            SELECT {EXECUTION_COLUMNS}
            FROM workflow_executions
            WHERE workflow_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#
        ))
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkflowExecution::try_from).collect()
    }
}
