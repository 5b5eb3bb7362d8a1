use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::RepositoryResult;

/// In-app notification addressed to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub recipient_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub metadata: JsonValue,
}

impl NotificationRequest {
    pub fn new(recipient_id: Uuid, notification_type: &str, title: &str, message: impl Into<String>) -> Self {
        Self {
            recipient_id,
            notification_type: notification_type.to_string(),
            title: title.to_string(),
            message: message.into(),
            link: None,
            metadata: JsonValue::Object(Default::default()),
        }
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, request: NotificationRequest) -> RepositoryResult<()>;
}

/// Stores notifications in the `notifications` table for the inbox UI
#[derive(Clone)]
pub struct PgNotificationService {
    pool: PgPool,
}

impl PgNotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationService {
    async fn notify(&self, request: NotificationRequest) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, notification_type, title, message, link, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.recipient_id)
        .bind(&request.notification_type)
        .bind(&request.title)
        .bind(&request.message)
        .bind(&request.link)
        .bind(&request.metadata)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Notification {} sent to {}",
            request.notification_type,
            request.recipient_id
        );
        Ok(())
    }
}

/// Deliver a notification, logging and discarding any failure
pub async fn notify_best_effort(sink: &dyn NotificationSink, request: NotificationRequest) {
    let recipient = request.recipient_id;
    let kind = request.notification_type.clone();
    if let Err(e) = sink.notify(request).await {
        tracing::warn!("Failed to send {} notification to {}: {}", kind, recipient, e);
    }
}
