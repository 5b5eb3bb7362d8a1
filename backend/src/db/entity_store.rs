use async_trait::async_trait;
use resolve_shared::{NewTask, Team};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::error::RepositoryResult;

/// Business records a workflow action can mutate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Lead,
    Deal,
}

/// Field a workflow is allowed to write through `UPDATE_FIELD`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutableField {
    /// Name used in action configs
    pub name: &'static str,
    pub column: &'static str,
    /// Postgres type the stored text is cast to
    pub sql_type: &'static str,
}

const fn field(name: &'static str, column: &'static str, sql_type: &'static str) -> MutableField {
    MutableField {
        name,
        column,
        sql_type,
    }
}

const LEAD_FIELDS: &[MutableField] = &[
    field("status", "status", "TEXT"),
    field("source", "source", "TEXT"),
    field("priority", "priority", "TEXT"),
    field("score", "score", "INTEGER"),
    field("company", "company", "TEXT"),
    field("title", "title", "TEXT"),
    field("notes", "notes", "TEXT"),
    field("estimatedValue", "estimated_value", "NUMERIC"),
];

const DEAL_FIELDS: &[MutableField] = &[
    field("stage", "stage", "TEXT"),
    field("value", "value", "NUMERIC"),
    field("currency", "currency", "TEXT"),
    field("probability", "probability", "INTEGER"),
    field("expectedCloseDate", "expected_close_date", "DATE"),
    field("notes", "notes", "TEXT"),
];

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Deal => "deal",
        }
    }

    /// Parse the payload `entityType` discriminator
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lead" | "leads" => Some(Self::Lead),
            "deal" | "deals" => Some(Self::Deal),
            _ => None,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Lead => "leads",
            Self::Deal => "deals",
        }
    }

    pub fn mutable_fields(&self) -> &'static [MutableField] {
        match self {
            Self::Lead => LEAD_FIELDS,
            Self::Deal => DEAL_FIELDS,
        }
    }

    /// Look up an allow-listed field by its config name (case-insensitive)
    pub fn mutable_field(&self, name: &str) -> Option<MutableField> {
        self.mutable_fields()
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name.trim()))
            .copied()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change applied to an entity row
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPatch {
    Assignee(Uuid),
    Status(String),
    /// Only constructible from the allow-list, see [`EntityKind::mutable_field`]
    Field { field: MutableField, value: Value },
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Returns false when no entity with `entity_id` exists
    async fn update_entity(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        patch: EntityPatch,
    ) -> RepositoryResult<bool>;

    async fn find_team(&self, team_id: Uuid) -> RepositoryResult<Option<Team>>;

    /// Idempotent: linking an already linked tag is not an error
    async fn add_tag(&self, kind: EntityKind, entity_id: Uuid, tag_id: Uuid) -> RepositoryResult<()>;

    async fn create_task(&self, task: &NewTask) -> RepositoryResult<Uuid>;
}
