use async_trait::async_trait;
use resolve_shared::{NewTask, Team};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::entity_store::{EntityKind, EntityPatch, EntityStore};
use crate::error::RepositoryResult;

/// Lead/deal mutations backed by the CRM tables
#[derive(Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Text form handed to `CAST($2::text AS ..)`; JSON null clears the column
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl EntityStore for PostgresEntityStore {
    async fn update_entity(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        patch: EntityPatch,
    ) -> RepositoryResult<bool> {
        let table = kind.table();

        let result = match patch {
            EntityPatch::Assignee(user_id) => {
                sqlx::query(&format!(
                    "UPDATE {table} SET assigned_to_id = $2, updated_at = NOW() WHERE id = $1"
                ))
                .bind(entity_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
            EntityPatch::Status(status) => {
                sqlx::query(&format!(
                    "UPDATE {table} SET status = $2, updated_at = NOW() WHERE id = $1"
                ))
                .bind(entity_id)
                .bind(status)
                .execute(&self.pool)
                .await?
            }
            // Column and type come from the static allow-list, never from the config
            EntityPatch::Field { field, value } => {
                sqlx::query(&format!(
                    "UPDATE {table} SET {} = CAST($2::text AS {}), updated_at = NOW() WHERE id = $1",
                    field.column, field.sql_type
                ))
                .bind(entity_id)
                .bind(field_text(&value))
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    async fn find_team(&self, team_id: Uuid) -> RepositoryResult<Option<Team>> {
        let team = sqlx::query_as::<_, Team>("SELECT id, name, manager_id FROM teams WHERE id = $1")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(team)
    }

    async fn add_tag(&self, kind: EntityKind, entity_id: Uuid, tag_id: Uuid) -> RepositoryResult<()> {
        let sql = match kind {
            EntityKind::Lead => {
                "INSERT INTO lead_tags (lead_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            }
            EntityKind::Deal => {
                "INSERT INTO deal_tags (deal_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            }
        };

        sqlx::query(sql)
            .bind(entity_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_task(&self, task: &NewTask) -> RepositoryResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO tasks (
                id, title, description, priority, due_date, lead_id, deal_id, assigned_to_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.priority)
        .bind(task.due_date)
        .bind(task.lead_id)
        .bind(task.deal_id)
        .bind(task.assigned_to)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_text() {
        assert_eq!(field_text(&json!("WON")), Some("WON".to_string()));
        assert_eq!(field_text(&json!(42)), Some("42".to_string()));
        assert_eq!(field_text(&json!(12.5)), Some("12.5".to_string()));
        assert_eq!(field_text(&json!(true)), Some("true".to_string()));
        assert_eq!(field_text(&Value::Null), None);
    }
}
