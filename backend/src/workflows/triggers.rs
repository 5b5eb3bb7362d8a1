// Workflow Triggers - Domain events that start workflow matching

use chrono::{DateTime, Utc};
use resolve_shared::TriggerType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::EntityKind;

/// Payload for trigger events. Schema-free: whatever shape the triggering
/// record has, plus ad hoc fields such as `entityType` or `oldStatus`.
pub type EventPayload = Value;

/// A trigger event that can initiate workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    pub trigger: TriggerType,
    #[serde(default)]
    pub payload: EventPayload,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Source of the trigger event
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EventSource {
    #[default]
    System,
    User(Uuid),
    Api,
    Import,
}

impl TriggerEvent {
    pub fn new(trigger: TriggerType, payload: EventPayload, source: EventSource) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger,
            payload,
            source,
            timestamp: Utc::now(),
        }
    }

    /// `record` is the created lead; `entityType` is set for the actions
    pub fn lead_created(mut record: Value, source: EventSource) -> Self {
        tag_entity(&mut record, EntityKind::Lead);
        Self::new(TriggerType::LeadCreated, record, source)
    }

    pub fn lead_updated(mut record: Value, source: EventSource) -> Self {
        tag_entity(&mut record, EntityKind::Lead);
        Self::new(TriggerType::LeadUpdated, record, source)
    }

    pub fn lead_status_changed(mut record: Value, old_status: &str, source: EventSource) -> Self {
        tag_entity(&mut record, EntityKind::Lead);
        if let Value::Object(map) = &mut record {
            map.insert("oldStatus".into(), Value::String(old_status.to_string()));
        }
        Self::new(TriggerType::LeadStatusChanged, record, source)
    }

    pub fn lead_assigned(mut record: Value, assigned_by: Uuid) -> Self {
        tag_entity(&mut record, EntityKind::Lead);
        Self::new(TriggerType::LeadAssigned, record, EventSource::User(assigned_by))
    }

    pub fn deal_created(mut record: Value, source: EventSource) -> Self {
        tag_entity(&mut record, EntityKind::Deal);
        Self::new(TriggerType::DealCreated, record, source)
    }

    pub fn deal_stage_changed(mut record: Value, old_stage: &str, source: EventSource) -> Self {
        tag_entity(&mut record, EntityKind::Deal);
        if let Value::Object(map) = &mut record {
            map.insert("oldStage".into(), Value::String(old_stage.to_string()));
        }
        Self::new(TriggerType::DealStageChanged, record, source)
    }

    pub fn deal_won(mut record: Value, source: EventSource) -> Self {
        tag_entity(&mut record, EntityKind::Deal);
        Self::new(TriggerType::DealWon, record, source)
    }

    pub fn deal_lost(mut record: Value, source: EventSource) -> Self {
        tag_entity(&mut record, EntityKind::Deal);
        Self::new(TriggerType::DealLost, record, source)
    }

    pub fn manual(payload: Value, user_id: Uuid) -> Self {
        Self::new(TriggerType::Manual, payload, EventSource::User(user_id))
    }
}

fn tag_entity(record: &mut Value, kind: EntityKind) {
    if let Value::Object(map) = record {
        map.entry("entityType")
            .or_insert_with(|| Value::String(kind.as_str().to_string()));
    }
}

/// Walk `payload` along a dotted path. Array elements are addressed by
/// numeric segments (`items.0.name`). Any missing step yields `None`.
pub fn resolve_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(payload, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Entity kind the payload concerns; `entityType` defaults to lead
pub fn entity_kind(payload: &Value) -> EntityKind {
    payload
        .get("entityType")
        .and_then(Value::as_str)
        .and_then(EntityKind::parse)
        .unwrap_or(EntityKind::Lead)
}

/// Id of the triggering entity; an unparseable id counts as missing
pub fn entity_id(payload: &Value) -> Option<Uuid> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}
