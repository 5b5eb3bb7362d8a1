// Execution Tracker - Lifecycle of a single workflow run record
//
// RUNNING -> SUCCESS | SKIPPED | FAILED, exactly once. `skip` and `succeed`
// borrow the `RunningExecution` handle so a failed write can still be
// closed with `fail`, which consumes it. The repository update is guarded
// on the row still being RUNNING.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use resolve_shared::{ExecutionStatus, WorkflowExecution};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use super::actions::ActionOutcome;
use crate::db::{ExecutionCompletion, ExecutionRepository};
use crate::error::RepositoryResult;

pub const CONDITIONS_NOT_MET: &str = "Conditions not met";

/// Handle to an execution that is still RUNNING
#[derive(Debug)]
pub struct RunningExecution {
    id: Uuid,
    workflow_id: Uuid,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl RunningExecution {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Clone)]
pub struct ExecutionTracker {
    executions: Arc<dyn ExecutionRepository>,
}

impl ExecutionTracker {
    pub fn new(executions: Arc<dyn ExecutionRepository>) -> Self {
        Self { executions }
    }

    /// Persist a RUNNING execution holding a verbatim copy of the payload
    pub async fn open(&self, workflow_id: Uuid, payload: &Value) -> RepositoryResult<RunningExecution> {
        let execution = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_id,
            trigger_data: payload.clone(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            result: None,
            error: None,
        };
        let clock = Instant::now();

        self.executions.create_execution(&execution).await?;

        Ok(RunningExecution {
            id: execution.id,
            workflow_id,
            started_at: execution.started_at,
            clock,
        })
    }

    pub async fn skip(&self, run: &RunningExecution, reason: &str) -> RepositoryResult<()> {
        self.close(run, ExecutionStatus::Skipped, Some(json!({ "reason": reason })), None)
            .await
    }

    pub async fn succeed(&self, run: &RunningExecution, action_results: &[ActionOutcome]) -> RepositoryResult<()> {
        let result = json!({ "actionResults": serde_json::to_value(action_results)? });
        self.close(run, ExecutionStatus::Success, Some(result), None).await
    }

    pub async fn fail(&self, run: RunningExecution, message: &str) -> RepositoryResult<()> {
        self.close(&run, ExecutionStatus::Failed, None, Some(message.to_string()))
            .await
    }

    async fn close(
        &self,
        run: &RunningExecution,
        status: ExecutionStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> RepositoryResult<()> {
        let duration_ms = i64::try_from(run.clock.elapsed().as_millis()).unwrap_or(i64::MAX);
        let completed_at = run
            .started_at
            .checked_add_signed(ChronoDuration::milliseconds(duration_ms))
            .unwrap_or_else(Utc::now);

        let completion = ExecutionCompletion {
            status,
            completed_at,
            duration_ms,
            result,
            error,
        };
        self.executions.complete_execution(run.id, &completion).await?;

        info!(
            "Execution {} of workflow {} finished as {} in {}ms",
            run.id, run.workflow_id, status, duration_ms
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockDb;
    use resolve_shared::ActionType;

    #[tokio::test]
    async fn test_skip_records_reason_and_duration() {
        let db = Arc::new(MockDb::new());
        let tracker = ExecutionTracker::new(db.clone());
        let payload = json!({ "status": "NEW", "budget": 500 });

        let run = tracker.open(Uuid::new_v4(), &payload).await.unwrap();
        let id = run.id();
        let running = db.find_execution_by_id(id).await.unwrap().unwrap();
        assert_eq!(running.status, ExecutionStatus::Running);
        assert_eq!(running.trigger_data, payload);

        tracker.skip(&run, CONDITIONS_NOT_MET).await.unwrap();

        let done = db.find_execution_by_id(id).await.unwrap().unwrap();
        assert_eq!(done.status, ExecutionStatus::Skipped);
        assert_eq!(done.result.unwrap()["reason"], "Conditions not met");
        assert!(done.error.is_none());

        let duration = done.duration_ms.unwrap();
        let completed_at = done.completed_at.unwrap();
        assert_eq!((completed_at - done.started_at).num_milliseconds(), duration);
    }

    #[tokio::test]
    async fn test_succeed_stores_action_results() {
        let db = Arc::new(MockDb::new());
        let tracker = ExecutionTracker::new(db.clone());

        let run = tracker.open(Uuid::new_v4(), &json!({})).await.unwrap();
        let id = run.id();
        let results = vec![
            ActionOutcome::success(ActionType::ChangeStatus, json!({ "status": "WON" })),
            ActionOutcome::failure(ActionType::AddTag, "tag store down"),
        ];
        tracker.succeed(&run, &results).await.unwrap();

        let done = db.find_execution_by_id(id).await.unwrap().unwrap();
        assert_eq!(done.status, ExecutionStatus::Success);
        let stored = &done.result.unwrap()["actionResults"];
        assert_eq!(stored.as_array().unwrap().len(), 2);
        assert_eq!(stored[1]["success"], false);
    }

    #[tokio::test]
    async fn test_fail_records_error_only() {
        let db = Arc::new(MockDb::new());
        let tracker = ExecutionTracker::new(db.clone());

        let run = tracker.open(Uuid::new_v4(), &json!({})).await.unwrap();
        let id = run.id();
        tracker.fail(run, "Invalid workflow definition: bad").await.unwrap();

        let done = db.find_execution_by_id(id).await.unwrap().unwrap();
        assert_eq!(done.status, ExecutionStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("Invalid workflow definition: bad"));
        assert!(done.result.is_none());
    }

    #[tokio::test]
    async fn test_failed_close_can_fall_back_to_fail() {
        let db = Arc::new(MockDb::new());
        let tracker = ExecutionTracker::new(db.clone());

        let run = tracker.open(Uuid::new_v4(), &json!({})).await.unwrap();
        let id = run.id();
        db.fail_next_completion();

        assert!(tracker.succeed(&run, &[]).await.is_err());
        assert_eq!(
            db.find_execution_by_id(id).await.unwrap().unwrap().status,
            ExecutionStatus::Running
        );

        tracker.fail(run, "could not record result").await.unwrap();
        let done = db.find_execution_by_id(id).await.unwrap().unwrap();
        assert_eq!(done.status, ExecutionStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("could not record result"));
    }

    #[tokio::test]
    async fn test_terminal_state_is_written_once() {
        let db = Arc::new(MockDb::new());
        let tracker = ExecutionTracker::new(db.clone());

        let run = tracker.open(Uuid::new_v4(), &json!({})).await.unwrap();
        let id = run.id();
        tracker.skip(&run, CONDITIONS_NOT_MET).await.unwrap();

        let err = tracker.fail(run, "late failure").await.unwrap_err();
        assert!(matches!(err, crate::error::RepositoryError::InvalidTransition(e) if e == id));
        assert_eq!(
            db.find_execution_by_id(id).await.unwrap().unwrap().status,
            ExecutionStatus::Skipped
        );
    }
}
