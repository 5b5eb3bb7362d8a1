// Workflow Engine - Trigger dispatch and single-workflow execution
//
// Error tiers: a failing action is recorded in the execution's
// `actionResults`; a fault in evaluation or action dispatch closes the
// execution as FAILED and is returned to the caller; audit and
// notification failures are logged and dropped.

use futures::future::join_all;
use resolve_shared::{ExecutionStatus, TriggerType, Workflow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::actions::ActionOutcome;
use super::conditions::evaluate;
use super::executor::ActionExecutor;
use super::tracker::{CONDITIONS_NOT_MET, ExecutionTracker, RunningExecution};
use crate::config::AutomationConfig;
use crate::db::{
    EntityStore, ExecutionRepository, MockDb, PostgresEntityStore, PostgresWorkflowRepository,
    WorkflowFilter, WorkflowRepository,
};
use crate::error::{WorkflowError, WorkflowResult};
use crate::services::{
    ActivityEntry, ActivitySink, NotificationRequest, NotificationSink, PgActivityLog,
    PgNotificationService, notify_best_effort, record_best_effort,
};

pub const ACTIVITY_TYPE: &str = "WORKFLOW";
pub const NOTIFY_EXECUTED: &str = "WORKFLOW_EXECUTED";
pub const NOTIFY_FAILED: &str = "WORKFLOW_FAILED";

/// Collaborators the engine reads from and writes to
#[derive(Clone)]
pub struct Stores {
    pub workflows: Arc<dyn WorkflowRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub entities: Arc<dyn EntityStore>,
    pub activity: Arc<dyn ActivitySink>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let repository = Arc::new(PostgresWorkflowRepository::new(pool.clone()));
        Self {
            workflows: repository.clone(),
            executions: repository,
            entities: Arc::new(PostgresEntityStore::new(pool.clone())),
            activity: Arc::new(PgActivityLog::new(pool.clone())),
            notifications: Arc::new(PgNotificationService::new(pool)),
        }
    }

    pub fn in_memory(db: Arc<MockDb>) -> Self {
        Self {
            workflows: db.clone(),
            executions: db.clone(),
            entities: db.clone(),
            activity: db.clone(),
            notifications: db,
        }
    }
}

/// Outcome of a run that reached a terminal state without an engine fault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ExecutionOutcome {
    Success {
        execution_id: Uuid,
        action_results: Vec<ActionOutcome>,
    },
    Skipped {
        execution_id: Uuid,
        reason: String,
    },
}

impl ExecutionOutcome {
    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::Success { execution_id, .. } | Self::Skipped { execution_id, .. } => *execution_id,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        match self {
            Self::Success { .. } => ExecutionStatus::Success,
            Self::Skipped { .. } => ExecutionStatus::Skipped,
        }
    }
}

/// Per-workflow result of a fan-out dispatch
#[derive(Debug)]
pub struct DispatchOutcome {
    pub workflow_id: Uuid,
    pub result: WorkflowResult<ExecutionOutcome>,
}

impl DispatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error_message(&self) -> Option<String> {
        self.result.as_ref().err().map(|e| e.to_string())
    }
}

#[derive(Clone)]
pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowRepository>,
    tracker: ExecutionTracker,
    executor: ActionExecutor,
    activity: Arc<dyn ActivitySink>,
    notifications: Arc<dyn NotificationSink>,
    config: AutomationConfig,
}

impl WorkflowEngine {
    pub fn new(stores: Stores, config: AutomationConfig) -> Self {
        Self {
            workflows: stores.workflows,
            tracker: ExecutionTracker::new(stores.executions),
            executor: ActionExecutor::new(stores.entities, config.action_timeout),
            activity: stores.activity,
            notifications: stores.notifications,
            config,
        }
    }

    /// Run every active workflow registered for `trigger` concurrently and
    /// collect one outcome per workflow. A failing workflow does not affect
    /// its siblings; only the initial lookup can fail the whole dispatch.
    pub async fn dispatch_for_trigger(
        &self,
        trigger: TriggerType,
        payload: &Value,
    ) -> WorkflowResult<Vec<DispatchOutcome>> {
        let workflows = self
            .workflows
            .find_workflows(&WorkflowFilter::dispatchable(trigger))
            .await?;

        info!("Trigger {} matched {} workflow(s)", trigger, workflows.len());

        let runs = workflows.iter().map(|workflow| async move {
            DispatchOutcome {
                workflow_id: workflow.id,
                result: self.run(workflow, payload).await,
            }
        });
        let outcomes = join_all(runs).await;

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        info!(
            "Trigger {} dispatched: {} succeeded or skipped, {} failed",
            trigger,
            outcomes.len() - failed,
            failed
        );

        Ok(outcomes)
    }

    /// Fire-and-forget variant of [`Self::dispatch_for_trigger`]
    pub fn spawn_dispatch(&self, trigger: TriggerType, payload: Value) -> JoinHandle<Vec<DispatchOutcome>> {
        let engine = self.clone();
        tokio::spawn(async move {
            match engine.dispatch_for_trigger(trigger, &payload).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    error!("Background dispatch for {} failed: {}", trigger, e);
                    Vec::new()
                }
            }
        })
    }

    /// Run one workflow by id, regardless of its active flag
    pub async fn execute_workflow(&self, workflow_id: Uuid, payload: &Value) -> WorkflowResult<ExecutionOutcome> {
        let workflow = self
            .workflows
            .find_workflow_by_id(workflow_id)
            .await?
            .ok_or(WorkflowError::NotFound(workflow_id))?;

        self.run(&workflow, payload).await
    }

    async fn run(&self, workflow: &Workflow, payload: &Value) -> WorkflowResult<ExecutionOutcome> {
        let run = self.tracker.open(workflow.id, payload).await?;
        let execution_id = run.id();

        let conditions = match workflow.condition_group() {
            Ok(group) => group,
            Err(e) => {
                let err = WorkflowError::Definition(format!("conditions: {}", e));
                return Err(self.fail(workflow, run, err).await);
            }
        };

        if !evaluate(&conditions, payload) {
            if let Err(e) = self.tracker.skip(&run, CONDITIONS_NOT_MET).await {
                return Err(self.fail(workflow, run, e.into()).await);
            }
            info!("Workflow {} skipped: {}", workflow.id, CONDITIONS_NOT_MET);
            return Ok(ExecutionOutcome::Skipped {
                execution_id,
                reason: CONDITIONS_NOT_MET.to_string(),
            });
        }

        let actions = match workflow.action_specs() {
            Ok(actions) => actions,
            Err(e) => {
                let err = WorkflowError::Definition(format!("actions: {}", e));
                return Err(self.fail(workflow, run, err).await);
            }
        };

        let action_results = self.executor.execute_actions(&actions, payload).await;
        if let Err(e) = self.tracker.succeed(&run, &action_results).await {
            return Err(self.fail(workflow, run, e.into()).await);
        }

        self.report_success(workflow, execution_id, &action_results).await;

        Ok(ExecutionOutcome::Success {
            execution_id,
            action_results,
        })
    }

    /// Close the run as FAILED, report it, and hand the error back
    async fn fail(&self, workflow: &Workflow, run: RunningExecution, err: WorkflowError) -> WorkflowError {
        let execution_id = run.id();
        let message = err.to_string();
        error!("Workflow {} failed: {}", workflow.id, message);

        if let Err(e) = self.tracker.fail(run, &message).await {
            warn!("Could not record failure of execution {}: {}", execution_id, e);
        }

        self.report_failure(workflow, execution_id, &message).await;
        err
    }

    async fn report_success(&self, workflow: &Workflow, execution_id: Uuid, results: &[ActionOutcome]) {
        let failed = results.iter().filter(|r| !r.success).count();
        let description = format!(
            "Workflow \"{}\" ran {} action(s), {} failed",
            workflow.name,
            results.len(),
            failed
        );

        let entry = ActivityEntry::new("Workflow executed", ACTIVITY_TYPE)
            .description(description.clone())
            .actor(workflow.created_by)
            .icon("zap")
            .metadata(activity_metadata(workflow, execution_id, results.len()));
        record_best_effort(self.activity.as_ref(), entry).await;

        if let Some(author) = workflow.created_by.filter(|_| self.config.notify_on_success) {
            let request = NotificationRequest::new(author, NOTIFY_EXECUTED, "Workflow executed", description)
                .link(format!("/workflows/{}", workflow.id))
                .metadata(json!({ "workflowId": workflow.id, "executionId": execution_id }));
            notify_best_effort(self.notifications.as_ref(), request).await;
        }
    }

    async fn report_failure(&self, workflow: &Workflow, execution_id: Uuid, message: &str) {
        let description = format!("Workflow \"{}\" failed: {}", workflow.name, message);

        let entry = ActivityEntry::new("Workflow failed", ACTIVITY_TYPE)
            .description(description.clone())
            .actor(workflow.created_by)
            .icon("alert-triangle")
            .metadata(activity_metadata(workflow, execution_id, 0));
        record_best_effort(self.activity.as_ref(), entry).await;

        if let Some(author) = workflow.created_by.filter(|_| self.config.notify_on_failure) {
            let request = NotificationRequest::new(author, NOTIFY_FAILED, "Workflow failed", description)
                .link(format!("/workflows/{}", workflow.id))
                .metadata(json!({ "workflowId": workflow.id, "executionId": execution_id, "error": message }));
            notify_best_effort(self.notifications.as_ref(), request).await;
        }
    }
}

fn activity_metadata(workflow: &Workflow, execution_id: Uuid, action_count: usize) -> Value {
    json!({
        "workflowId": workflow.id,
        "executionId": execution_id,
        "trigger": workflow.trigger,
        "actionCount": action_count
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use crate::services::audit::MockActivitySink;
    use crate::services::notifications::MockNotificationSink;
    use resolve_shared::{ActionSpec, Condition, ConditionGroup, NewWorkflow};

    fn engine_with_sinks(
        db: Arc<MockDb>,
        activity: MockActivitySink,
        notifications: MockNotificationSink,
    ) -> WorkflowEngine {
        let stores = Stores {
            activity: Arc::new(activity),
            notifications: Arc::new(notifications),
            ..Stores::in_memory(db)
        };
        WorkflowEngine::new(stores, AutomationConfig::default())
    }

    async fn authored_workflow(db: &MockDb, author: Option<Uuid>) -> Workflow {
        let mut new = NewWorkflow::new("Qualify hot leads", TriggerType::LeadCreated)
            .with_conditions(ConditionGroup::and(vec![Condition::equals("status", json!("NEW"))]))
            .with_actions(vec![ActionSpec::send_email("sales@acme.test", "New lead", "{{name}}")]);
        new.created_by = author;
        db.create_workflow(&new).await.unwrap()
    }

    #[tokio::test]
    async fn test_sink_failures_do_not_change_outcome() {
        let db = Arc::new(MockDb::new());
        let workflow = authored_workflow(&db, Some(Uuid::new_v4())).await;

        let mut activity = MockActivitySink::new();
        activity
            .expect_record()
            .withf(|e| e.title == "Workflow executed" && e.icon.as_deref() == Some("zap"))
            .times(1)
            .returning(|_| Err(RepositoryError::Unavailable("feed down".into())));
        let mut notifications = MockNotificationSink::new();
        notifications
            .expect_notify()
            .withf(|n| n.notification_type == NOTIFY_EXECUTED)
            .times(1)
            .returning(|_| Err(RepositoryError::Unavailable("inbox down".into())));

        let engine = engine_with_sinks(db.clone(), activity, notifications);
        let outcome = engine
            .execute_workflow(workflow.id, &json!({ "status": "NEW", "name": "Acme" }))
            .await
            .unwrap();

        assert_eq!(outcome.status(), ExecutionStatus::Success);
        let stored = db.find_execution_by_id(outcome.execution_id()).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_skip_has_no_side_effects() {
        let db = Arc::new(MockDb::new());
        let workflow = authored_workflow(&db, Some(Uuid::new_v4())).await;

        let mut activity = MockActivitySink::new();
        activity.expect_record().times(0);
        let mut notifications = MockNotificationSink::new();
        notifications.expect_notify().times(0);

        let engine = engine_with_sinks(db, activity, notifications);
        let outcome = engine
            .execute_workflow(workflow.id, &json!({ "status": "LOST" }))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExecutionOutcome::Skipped {
                execution_id: outcome.execution_id(),
                reason: "Conditions not met".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_no_notification_without_author() {
        let db = Arc::new(MockDb::new());
        let workflow = authored_workflow(&db, None).await;

        let mut activity = MockActivitySink::new();
        activity
            .expect_record()
            .withf(|e| e.actor_id.is_none() && e.metadata["actionCount"] == 1)
            .times(1)
            .returning(|_| Ok(()));
        let mut notifications = MockNotificationSink::new();
        notifications.expect_notify().times(0);

        let engine = engine_with_sinks(db, activity, notifications);
        engine
            .execute_workflow(workflow.id, &json!({ "status": "NEW" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_broken_definition_reports_failure() {
        let db = Arc::new(MockDb::new());
        let author = Uuid::new_v4();
        let mut workflow = authored_workflow(&db, Some(author)).await;
        workflow.id = Uuid::new_v4();
        workflow.actions = json!({ "not": "a list" });
        db.insert_workflow_record(workflow.clone());

        let mut activity = MockActivitySink::new();
        activity
            .expect_record()
            .withf(|e| e.title == "Workflow failed" && e.icon.as_deref() == Some("alert-triangle"))
            .times(1)
            .returning(|_| Ok(()));
        let mut notifications = MockNotificationSink::new();
        let link = format!("/workflows/{}", workflow.id);
        notifications
            .expect_notify()
            .withf(move |n| {
                n.notification_type == NOTIFY_FAILED && n.recipient_id == author && n.link.as_deref() == Some(link.as_str())
            })
            .times(1)
            .returning(|_| Ok(()));

        let engine = engine_with_sinks(db.clone(), activity, notifications);
        let err = engine
            .execute_workflow(workflow.id, &json!({ "status": "NEW" }))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Definition(_)));
        let failed = db
            .executions()
            .into_iter()
            .find(|e| e.workflow_id == workflow.id)
            .unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.error, Some(err.to_string()));
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_not_found() {
        let db = Arc::new(MockDb::new());
        let engine = WorkflowEngine::new(Stores::in_memory(db.clone()), AutomationConfig::default());

        let id = Uuid::new_v4();
        let err = engine.execute_workflow(id, &json!({})).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(db.executions().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_dispatch_runs_in_background() {
        let db = Arc::new(MockDb::new());
        authored_workflow(&db, None).await;
        let engine = WorkflowEngine::new(Stores::in_memory(db.clone()), AutomationConfig::default());

        let outcomes = engine
            .spawn_dispatch(TriggerType::LeadCreated, json!({ "status": "NEW" }))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_ok());
        assert_eq!(db.activities().len(), 1);
    }
}
