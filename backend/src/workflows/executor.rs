// Workflow Executor - Runs a workflow's actions in order against the entity store

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use regex::{Captures, Regex};
use resolve_shared::{ActionSpec, ActionType, NewTask};
use serde_json::{Map, Value, json};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use super::actions::{
    ActionError, ActionOutcome, ActionResult, NO_ENTITY_ID, NO_TEAM_ID, TEAM_MANAGER_NOT_FOUND,
    not_implemented, soft_error,
};
use super::triggers::{entity_id, entity_kind, resolve_path};
use crate::db::{EntityKind, EntityPatch, EntityStore};

static TEMPLATE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("template pattern is valid"));

const DEFAULT_TASK_PRIORITY: &str = "MEDIUM";

#[derive(Clone)]
pub struct ActionExecutor {
    store: Arc<dyn EntityStore>,
    action_timeout: Duration,
}

impl ActionExecutor {
    pub fn new(store: Arc<dyn EntityStore>, action_timeout: Duration) -> Self {
        Self {
            store,
            action_timeout,
        }
    }

    /// Run `actions` sequentially. The returned list always has one entry
    /// per action, in order; a failing action never stops the ones after it.
    pub async fn execute_actions(&self, actions: &[ActionSpec], payload: &Value) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            outcomes.push(self.execute_action(action, payload).await);
        }
        outcomes
    }

    /// Execute a single action
    pub async fn execute_action(&self, action: &ActionSpec, payload: &Value) -> ActionOutcome {
        let start = Instant::now();
        let action_type = action.action_type.clone();

        info!("Executing action: {}", action_type);

        // Process template variables in config
        let config = process_templates(&action.config, payload);

        let result = match tokio::time::timeout(
            self.action_timeout,
            self.dispatch(&action_type, &config, payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ActionError::Timeout(self.action_timeout)),
        };

        let duration = start.elapsed().as_millis() as i64;

        match result {
            Ok(value) => ActionOutcome::success(action_type, value).with_duration(duration),
            Err(e) => {
                warn!("Action {} failed: {}", action_type, e);
                ActionOutcome::failure(action_type, &e.to_string()).with_duration(duration)
            }
        }
    }

    async fn dispatch(
        &self,
        action_type: &ActionType,
        config: &Map<String, Value>,
        payload: &Value,
    ) -> ActionResult<Value> {
        match action_type {
            ActionType::AssignToUser => self.assign_to_user(config, payload).await,
            ActionType::AssignToTeam => self.assign_to_team(config, payload).await,
            ActionType::ChangeStatus => self.change_status(config, payload).await,
            ActionType::AddTag => self.add_tag(config, payload).await,
            ActionType::CreateTask => self.create_task(config, payload).await,
            ActionType::SendEmail => send_email(config, payload),
            ActionType::UpdateField => self.update_field(config, payload).await,
            ActionType::RemoveTag
            | ActionType::SendWhatsapp
            | ActionType::SendWebhook
            | ActionType::Unknown(_) => Ok(not_implemented(action_type)),
        }
    }

    async fn apply(&self, kind: EntityKind, id: Uuid, patch: EntityPatch) -> ActionResult<()> {
        if self.store.update_entity(kind, id, patch).await? {
            Ok(())
        } else {
            Err(ActionError::EntityNotFound { kind, id })
        }
    }

    async fn assign_to_user(&self, config: &Map<String, Value>, payload: &Value) -> ActionResult<Value> {
        let Some(id) = entity_id(payload) else {
            return Ok(soft_error(NO_ENTITY_ID));
        };
        let user_id = config_uuid(config, "userId")?;
        let kind = entity_kind(payload);

        self.apply(kind, id, EntityPatch::Assignee(user_id)).await?;

        Ok(json!({ "entityId": id, "entityType": kind, "assignedTo": user_id }))
    }

    async fn assign_to_team(&self, config: &Map<String, Value>, payload: &Value) -> ActionResult<Value> {
        let Some(id) = entity_id(payload) else {
            return Ok(soft_error(NO_ENTITY_ID));
        };
        if config_str(config, "teamId").is_none() {
            return Ok(soft_error(NO_TEAM_ID));
        }
        let team_id = config_uuid(config, "teamId")?;

        let manager_id = self
            .store
            .find_team(team_id)
            .await?
            .and_then(|team| team.manager_id);
        let Some(manager_id) = manager_id else {
            return Ok(soft_error(TEAM_MANAGER_NOT_FOUND));
        };

        let kind = entity_kind(payload);
        self.apply(kind, id, EntityPatch::Assignee(manager_id)).await?;

        Ok(json!({
            "entityId": id,
            "entityType": kind,
            "teamId": team_id,
            "assignedTo": manager_id
        }))
    }

    async fn change_status(&self, config: &Map<String, Value>, payload: &Value) -> ActionResult<Value> {
        let Some(id) = entity_id(payload) else {
            return Ok(soft_error(NO_ENTITY_ID));
        };
        let status = config_str(config, "status").ok_or(ActionError::MissingConfig("status"))?;
        let kind = entity_kind(payload);

        self.apply(kind, id, EntityPatch::Status(status.to_string())).await?;

        Ok(json!({ "entityId": id, "entityType": kind, "status": status }))
    }

    async fn add_tag(&self, config: &Map<String, Value>, payload: &Value) -> ActionResult<Value> {
        let Some(id) = entity_id(payload) else {
            return Ok(soft_error(NO_ENTITY_ID));
        };
        let tag_id = config_uuid(config, "tagId")?;
        let kind = entity_kind(payload);

        self.store.add_tag(kind, id, tag_id).await?;

        Ok(json!({ "entityId": id, "entityType": kind, "tagId": tag_id }))
    }

    async fn create_task(&self, config: &Map<String, Value>, payload: &Value) -> ActionResult<Value> {
        let title = config_str(config, "title").ok_or(ActionError::MissingConfig("title"))?;
        let priority = config_str(config, "priority")
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| DEFAULT_TASK_PRIORITY.to_string());
        let due_date = task_due_date(config, Utc::now())?;

        let assigned_to = match config_str(config, "assignedTo") {
            Some(_) => Some(config_uuid(config, "assignedTo")?),
            None => payload
                .get("assignedToId")
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok()),
        };

        let entity = entity_id(payload);
        let kind = entity_kind(payload);
        let task = NewTask {
            title: title.to_string(),
            description: config_str(config, "description").map(str::to_string),
            priority,
            due_date,
            lead_id: entity.filter(|_| kind == EntityKind::Lead),
            deal_id: entity.filter(|_| kind == EntityKind::Deal),
            assigned_to,
        };

        let task_id = self.store.create_task(&task).await?;

        Ok(json!({
            "taskId": task_id,
            "title": task.title,
            "priority": task.priority,
            "dueDate": task.due_date,
            "assignedTo": task.assigned_to
        }))
    }

    async fn update_field(&self, config: &Map<String, Value>, payload: &Value) -> ActionResult<Value> {
        let Some(id) = entity_id(payload) else {
            return Ok(soft_error(NO_ENTITY_ID));
        };
        let name = config_str(config, "fieldName").ok_or(ActionError::MissingConfig("fieldName"))?;
        let kind = entity_kind(payload);

        let field = kind
            .mutable_field(name)
            .ok_or_else(|| ActionError::FieldNotUpdatable {
                field: name.to_string(),
                kind,
            })?;
        let value = config.get("fieldValue").cloned().unwrap_or(Value::Null);

        self.apply(
            kind,
            id,
            EntityPatch::Field {
                field,
                value: value.clone(),
            },
        )
        .await?;

        Ok(json!({ "entityId": id, "entityType": kind, "field": field.name, "value": value }))
    }
}

/// Mail delivery is handled elsewhere; only the intent is recorded
fn send_email(config: &Map<String, Value>, payload: &Value) -> ActionResult<Value> {
    let to = config_str(config, "to")
        .or_else(|| payload.get("email").and_then(Value::as_str))
        .ok_or(ActionError::MissingConfig("to"))?;
    let subject = config_str(config, "subject").unwrap_or_default();

    info!("Workflow email to {} with subject '{}' recorded", to, subject);

    Ok(json!({ "to": to, "subject": subject, "delivered": false }))
}

/// Non-blank string config value
fn config_str<'a>(config: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn config_uuid(config: &Map<String, Value>, key: &'static str) -> ActionResult<Uuid> {
    let raw = config_str(config, key).ok_or(ActionError::MissingConfig(key))?;
    Uuid::parse_str(raw).map_err(|e| ActionError::InvalidConfig {
        key,
        reason: e.to_string(),
    })
}

/// `dueDate` (RFC 3339 or `YYYY-MM-DD`) wins over `dueInDays`
fn task_due_date(config: &Map<String, Value>, now: DateTime<Utc>) -> ActionResult<Option<DateTime<Utc>>> {
    if let Some(raw) = config_str(config, "dueDate") {
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(at.with_timezone(&Utc)));
        }
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Some(dt.and_utc()))
            .ok_or_else(|| ActionError::InvalidConfig {
                key: "dueDate",
                reason: format!("'{}' is not a date", raw),
            });
    }

    let days = match config.get("dueInDays") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    days.and_then(ChronoDuration::try_days)
        .and_then(|d| now.checked_add_signed(d))
        .map(Some)
        .ok_or_else(|| ActionError::InvalidConfig {
            key: "dueInDays",
            reason: "expected a whole number of days".to_string(),
        })
}

/// Replace `{{path}}` references in string values with payload fields.
/// Unresolvable references are left as written.
pub fn process_templates(config: &Map<String, Value>, payload: &Value) -> Map<String, Value> {
    config
        .iter()
        .map(|(k, v)| (k.clone(), process_value(v, payload)))
        .collect()
}

fn process_value(value: &Value, payload: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(replace_template_vars(s, payload)),
        Value::Object(map) => Value::Object(process_templates(map, payload)),
        Value::Array(items) => Value::Array(items.iter().map(|v| process_value(v, payload)).collect()),
        other => other.clone(),
    }
}

fn replace_template_vars(template: &str, payload: &Value) -> String {
    TEMPLATE_VAR
        .replace_all(template, |caps: &Captures| match resolve_path(payload, &caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
