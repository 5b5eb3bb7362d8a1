//! In-memory implementation of every store the engine talks to.
//!
//! Used by the test suites and by embedders that want to run workflows
//! without a database.

use async_trait::async_trait;
use chrono::Utc;
use resolve_shared::{
    ExecutionStatus, NewTask, NewWorkflow, Team, Workflow, WorkflowExecution, WorkflowUpdate,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::entity_store::{EntityKind, EntityPatch, EntityStore};
use super::workflow_repository::{
    ExecutionCompletion, ExecutionRepository, WorkflowFilter, WorkflowRepository,
};
use crate::error::{RepositoryError, RepositoryResult};
use crate::services::audit::{ActivityEntry, ActivitySink};
use crate::services::notifications::{NotificationRequest, NotificationSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MockDb {
    workflows: Mutex<Vec<Workflow>>,
    executions: Mutex<Vec<WorkflowExecution>>,
    entities: Mutex<HashMap<(EntityKind, Uuid), Map<String, Value>>>,
    teams: Mutex<HashMap<Uuid, Team>>,
    tags: Mutex<Vec<(EntityKind, Uuid, Uuid)>>,
    tasks: Mutex<Vec<(Uuid, NewTask)>>,
    activities: Mutex<Vec<ActivityEntry>>,
    notifications: Mutex<Vec<NotificationRequest>>,
    /// Every entity write fails with `Unavailable`
    pub fail_entity_writes: AtomicBool,
    pub fail_activities: AtomicBool,
    pub fail_notifications: AtomicBool,
    /// The next terminal execution write fails with `Unavailable`
    pub fail_completion_once: AtomicBool,
    /// Sleep applied before every entity write
    pub entity_write_delay: Mutex<Option<Duration>>,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a workflow exactly as given, bypassing validation
    pub fn insert_workflow_record(&self, workflow: Workflow) {
        lock(&self.workflows).push(workflow);
    }

    pub fn insert_entity(&self, kind: EntityKind, id: Uuid, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        lock(&self.entities).insert((kind, id), fields);
    }

    pub fn entity(&self, kind: EntityKind, id: Uuid) -> Option<Map<String, Value>> {
        lock(&self.entities).get(&(kind, id)).cloned()
    }

    pub fn insert_team(&self, team: Team) {
        lock(&self.teams).insert(team.id, team);
    }

    pub fn tags_for(&self, kind: EntityKind, id: Uuid) -> Vec<Uuid> {
        lock(&self.tags)
            .iter()
            .filter(|(k, entity, _)| *k == kind && *entity == id)
            .map(|(_, _, tag)| *tag)
            .collect()
    }

    pub fn tasks(&self) -> Vec<(Uuid, NewTask)> {
        lock(&self.tasks).clone()
    }

    pub fn activities(&self) -> Vec<ActivityEntry> {
        lock(&self.activities).clone()
    }

    pub fn notifications(&self) -> Vec<NotificationRequest> {
        lock(&self.notifications).clone()
    }

    /// Every execution ever created, in creation order
    pub fn executions(&self) -> Vec<WorkflowExecution> {
        lock(&self.executions).clone()
    }

    pub fn fail_next_completion(&self) {
        self.fail_completion_once.store(true, Ordering::SeqCst);
    }

    pub fn set_entity_write_delay(&self, delay: Duration) {
        *lock(&self.entity_write_delay) = Some(delay);
    }

    async fn entity_write_gate(&self) -> RepositoryResult<()> {
        let delay = *lock(&self.entity_write_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_entity_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("Mock entity store failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowRepository for MockDb {
    async fn create_workflow(&self, workflow: &NewWorkflow) -> RepositoryResult<Workflow> {
        let now = Utc::now();
        let record = Workflow {
            id: Uuid::new_v4(),
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            is_active: workflow.is_active,
            trigger: workflow.trigger,
            trigger_data: workflow.trigger_data.clone(),
            conditions: serde_json::to_value(&workflow.conditions)?,
            actions: serde_json::to_value(&workflow.actions)?,
            created_by: workflow.created_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        lock(&self.workflows).push(record.clone());
        Ok(record)
    }

    async fn find_workflows(&self, filter: &WorkflowFilter) -> RepositoryResult<Vec<Workflow>> {
        Ok(lock(&self.workflows)
            .iter()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect())
    }

    async fn find_workflow_by_id(&self, workflow_id: Uuid) -> RepositoryResult<Option<Workflow>> {
        Ok(lock(&self.workflows)
            .iter()
            .find(|w| w.id == workflow_id && !w.is_deleted())
            .cloned())
    }

    async fn update_workflow(
        &self,
        workflow_id: Uuid,
        update: &WorkflowUpdate,
    ) -> RepositoryResult<Option<Workflow>> {
        let conditions = update.conditions.as_ref().map(serde_json::to_value).transpose()?;
        let actions = update.actions.as_ref().map(serde_json::to_value).transpose()?;

        let mut workflows = lock(&self.workflows);
        let Some(workflow) = workflows
            .iter_mut()
            .find(|w| w.id == workflow_id && !w.is_deleted())
        else {
            return Ok(None);
        };

        if let Some(name) = &update.name {
            workflow.name = name.clone();
        }
        if let Some(description) = &update.description {
            workflow.description = Some(description.clone());
        }
        if let Some(trigger) = update.trigger {
            workflow.trigger = trigger;
        }
        if let Some(trigger_data) = &update.trigger_data {
            workflow.trigger_data = Some(trigger_data.clone());
        }
        if let Some(is_active) = update.is_active {
            workflow.is_active = is_active;
        }
        if let Some(conditions) = conditions {
            workflow.conditions = conditions;
        }
        if let Some(actions) = actions {
            workflow.actions = actions;
        }
        workflow.updated_at = Utc::now();

        Ok(Some(workflow.clone()))
    }

    async fn soft_delete_workflow(&self, workflow_id: Uuid) -> RepositoryResult<bool> {
        let mut workflows = lock(&self.workflows);
        match workflows
            .iter_mut()
            .find(|w| w.id == workflow_id && !w.is_deleted())
        {
            Some(workflow) => {
                let now = Utc::now();
                workflow.deleted_at = Some(now);
                workflow.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ExecutionRepository for MockDb {
    async fn create_execution(&self, execution: &WorkflowExecution) -> RepositoryResult<()> {
        lock(&self.executions).push(execution.clone());
        Ok(())
    }

    async fn complete_execution(
        &self,
        execution_id: Uuid,
        completion: &ExecutionCompletion,
    ) -> RepositoryResult<()> {
        if self.fail_completion_once.swap(false, Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("Mock execution store failure".into()));
        }

        let mut executions = lock(&self.executions);
        let execution = executions
            .iter_mut()
            .find(|e| e.id == execution_id && e.status == ExecutionStatus::Running)
            .ok_or(RepositoryError::InvalidTransition(execution_id))?;

        execution.status = completion.status;
        execution.completed_at = Some(completion.completed_at);
        execution.duration_ms = Some(completion.duration_ms);
        execution.result = completion.result.clone();
        execution.error = completion.error.clone();
        Ok(())
    }

    async fn find_execution_by_id(
        &self,
        execution_id: Uuid,
    ) -> RepositoryResult<Option<WorkflowExecution>> {
        Ok(lock(&self.executions)
            .iter()
            .find(|e| e.id == execution_id)
            .cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<(Vec<WorkflowExecution>, i64)> {
        let mut matching: Vec<WorkflowExecution> = lock(&self.executions)
            .iter()
            .rev()
            .filter(|e| workflow_id.is_none_or(|id| e.workflow_id == id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();

        Ok((page, total))
    }

    async fn recent_executions(
        &self,
        workflow_id: Uuid,
        limit: i64,
    ) -> RepositoryResult<Vec<WorkflowExecution>> {
        let (executions, _) = self.list_executions(Some(workflow_id), limit, 0).await?;
        Ok(executions)
    }
}

#[async_trait]
impl EntityStore for MockDb {
    async fn update_entity(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        patch: EntityPatch,
    ) -> RepositoryResult<bool> {
        self.entity_write_gate().await?;

        let mut entities = lock(&self.entities);
        let Some(record) = entities.get_mut(&(kind, entity_id)) else {
            return Ok(false);
        };

        match patch {
            EntityPatch::Assignee(user_id) => {
                record.insert("assigned_to_id".into(), Value::String(user_id.to_string()));
            }
            EntityPatch::Status(status) => {
                record.insert("status".into(), Value::String(status));
            }
            EntityPatch::Field { field, value } => {
                record.insert(field.column.into(), value);
            }
        }
        Ok(true)
    }

    async fn find_team(&self, team_id: Uuid) -> RepositoryResult<Option<Team>> {
        Ok(lock(&self.teams).get(&team_id).cloned())
    }

    async fn add_tag(&self, kind: EntityKind, entity_id: Uuid, tag_id: Uuid) -> RepositoryResult<()> {
        self.entity_write_gate().await?;

        if !lock(&self.entities).contains_key(&(kind, entity_id)) {
            return Err(RepositoryError::Unavailable(format!(
                "{} {} does not exist",
                kind, entity_id
            )));
        }

        let mut tags = lock(&self.tags);
        if !tags.contains(&(kind, entity_id, tag_id)) {
            tags.push((kind, entity_id, tag_id));
        }
        Ok(())
    }

    async fn create_task(&self, task: &NewTask) -> RepositoryResult<Uuid> {
        self.entity_write_gate().await?;

        let id = Uuid::new_v4();
        lock(&self.tasks).push((id, task.clone()));
        Ok(id)
    }
}

#[async_trait]
impl ActivitySink for MockDb {
    async fn record(&self, entry: ActivityEntry) -> RepositoryResult<()> {
        if self.fail_activities.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("Mock activity failure".into()));
        }
        lock(&self.activities).push(entry);
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for MockDb {
    async fn notify(&self, request: NotificationRequest) -> RepositoryResult<()> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("Mock notification failure".into()));
        }
        lock(&self.notifications).push(request);
        Ok(())
    }
}
