use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::RepositoryResult;

/// Entry in the platform activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub title: String,
    pub description: Option<String>,
    /// Type tag, e.g. `WORKFLOW`
    pub activity_type: String,
    pub actor_id: Option<Uuid>,
    /// Icon hint for the feed renderer
    pub icon: Option<String>,
    pub metadata: JsonValue,
}

impl ActivityEntry {
    pub fn new(title: &str, activity_type: &str) -> Self {
        Self {
            title: title.to_string(),
            description: None,
            activity_type: activity_type.to_string(),
            actor_id: None,
            icon: None,
            metadata: JsonValue::Object(Default::default()),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn icon(mut self, icon: &str) -> Self {
        self.icon = Some(icon.to_string());
        self
    }

    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, entry: ActivityEntry) -> RepositoryResult<()>;
}

/// Writes activity entries to the `activities` table
#[derive(Clone)]
pub struct PgActivityLog {
    pool: PgPool,
}

impl PgActivityLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivitySink for PgActivityLog {
    async fn record(&self, entry: ActivityEntry) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, title, description, activity_type, actor_id, icon, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.title)
        .bind(&entry.description)
        .bind(&entry.activity_type)
        .bind(entry.actor_id)
        .bind(&entry.icon)
        .bind(&entry.metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Record an entry, logging and discarding any failure
pub async fn record_best_effort(sink: &dyn ActivitySink, entry: ActivityEntry) {
    let title = entry.title.clone();
    if let Err(e) = sink.record(entry).await {
        tracing::warn!("Failed to record activity '{}': {}", title, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use serde_json::json;

    #[test]
    fn test_entry_builder() {
        let actor = Uuid::new_v4();
        let entry = ActivityEntry::new("Workflow executed", "WORKFLOW")
            .description("Workflow \"Hot leads\" ran 2 actions")
            .actor(Some(actor))
            .icon("zap")
            .metadata(json!({ "actionCount": 2 }));

        assert_eq!(entry.activity_type, "WORKFLOW");
        assert_eq!(entry.actor_id, Some(actor));
        assert_eq!(entry.icon.as_deref(), Some("zap"));
        assert_eq!(entry.metadata["actionCount"], 2);
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failure() {
        let mut sink = MockActivitySink::new();
        sink.expect_record()
            .times(1)
            .returning(|_| Err(RepositoryError::Unavailable("activity feed down".into())));

        record_best_effort(&sink, ActivityEntry::new("Workflow failed", "WORKFLOW")).await;
    }
}
