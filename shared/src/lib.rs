use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when a stored enum name does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

// ===== Triggers =====

/// Domain events that workflows can subscribe to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    // Lead triggers
    LeadCreated,
    LeadUpdated,
    LeadStatusChanged,
    LeadAssigned,

    // Deal triggers
    DealCreated,
    DealUpdated,
    DealStageChanged,
    DealAssigned,
    DealWon,
    DealLost,

    // Other CRM triggers
    ContactCreated,
    TaskCompleted,

    Manual,
}

impl TriggerType {
    pub const ALL: [TriggerType; 13] = [
        Self::LeadCreated,
        Self::LeadUpdated,
        Self::LeadStatusChanged,
        Self::LeadAssigned,
        Self::DealCreated,
        Self::DealUpdated,
        Self::DealStageChanged,
        Self::DealAssigned,
        Self::DealWon,
        Self::DealLost,
        Self::ContactCreated,
        Self::TaskCompleted,
        Self::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadCreated => "LEAD_CREATED",
            Self::LeadUpdated => "LEAD_UPDATED",
            Self::LeadStatusChanged => "LEAD_STATUS_CHANGED",
            Self::LeadAssigned => "LEAD_ASSIGNED",
            Self::DealCreated => "DEAL_CREATED",
            Self::DealUpdated => "DEAL_UPDATED",
            Self::DealStageChanged => "DEAL_STAGE_CHANGED",
            Self::DealAssigned => "DEAL_ASSIGNED",
            Self::DealWon => "DEAL_WON",
            Self::DealLost => "DEAL_LOST",
            Self::ContactCreated => "CONTACT_CREATED",
            Self::TaskCompleted => "TASK_COMPLETED",
            Self::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseEnumError {
                kind: "trigger type",
                value: s.to_string(),
            })
    }
}

// ===== Conditions =====

/// Logic connective of a condition group.
///
/// Decoding never fails: anything other than a case-insensitive `"OR"`
/// (including a missing value) is read as `AND`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE", from = "Value")]
pub enum LogicOperator {
    #[default]
    And,
    Or,
}

impl From<Value> for LogicOperator {
    fn from(value: Value) -> Self {
        match value.as_str() {
            Some(s) if s.trim().eq_ignore_ascii_case("or") => Self::Or,
            _ => Self::And,
        }
    }
}

/// Comparison applied by a condition leaf.
///
/// Unrecognised operator names, and operators that are not strings at all,
/// are kept as `Unknown` so a stored workflow still decodes; such leaves
/// always evaluate to false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "Value", into = "String")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    IsEmpty,
    IsNotEmpty,
    Unknown(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::Contains => "CONTAINS",
            Self::NotContains => "NOT_CONTAINS",
            Self::GreaterThan => "GREATER_THAN",
            Self::LessThan => "LESS_THAN",
            Self::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            Self::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Self::IsEmpty => "IS_EMPTY",
            Self::IsNotEmpty => "IS_NOT_EMPTY",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for ConditionOperator {
    fn from(name: String) -> Self {
        match name.as_str() {
            "EQUALS" => Self::Equals,
            "NOT_EQUALS" => Self::NotEquals,
            "CONTAINS" => Self::Contains,
            "NOT_CONTAINS" => Self::NotContains,
            "GREATER_THAN" => Self::GreaterThan,
            "LESS_THAN" => Self::LessThan,
            "GREATER_THAN_OR_EQUAL" => Self::GreaterThanOrEqual,
            "LESS_THAN_OR_EQUAL" => Self::LessThanOrEqual,
            "IS_EMPTY" => Self::IsEmpty,
            "IS_NOT_EMPTY" => Self::IsNotEmpty,
            _ => Self::Unknown(name),
        }
    }
}

impl From<Value> for ConditionOperator {
    fn from(value: Value) -> Self {
        match value {
            Value::String(name) => Self::from(name),
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        match op {
            ConditionOperator::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// A single field/operator/value test against an event payload.
///
/// Decoding never fails. A leaf that is not an object, or that lacks a
/// usable `operator`, decodes with an `Unknown` operator and so never
/// matches; a missing or non-string `field` reads as the empty path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "Value")]
pub struct Condition {
    /// Dotted path into the payload, e.g. `company.name`
    pub field: String,
    pub operator: ConditionOperator,
    /// Comparison operand; ignored by the emptiness operators
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl From<Value> for Condition {
    fn from(leaf: Value) -> Self {
        let mut leaf = match leaf {
            Value::Object(map) => map,
            other => return Self::new("", ConditionOperator::Unknown(other.to_string()), None),
        };

        let field = match leaf.remove("field") {
            Some(Value::String(field)) => field,
            _ => String::new(),
        };
        let operator = leaf
            .remove("operator")
            .map(ConditionOperator::from)
            .unwrap_or_else(|| ConditionOperator::Unknown(String::new()));
        let value = leaf.remove("value").filter(|v| !v.is_null());

        Self {
            field,
            operator,
            value,
        }
    }
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: Option<Value>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
        }
    }

    pub fn equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::Equals, Some(value))
    }

    pub fn not_equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::NotEquals, Some(value))
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, ConditionOperator::Contains, Some(Value::String(value.to_string())))
    }

    pub fn greater_than(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, Some(value))
    }

    pub fn less_than(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::LessThan, Some(value))
    }

    pub fn is_empty(field: &str) -> Self {
        Self::new(field, ConditionOperator::IsEmpty, None)
    }

    pub fn is_not_empty(field: &str) -> Self {
        Self::new(field, ConditionOperator::IsNotEmpty, None)
    }
}

/// Group of condition leaves joined by one logic connective.
/// An empty group always passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConditionGroup {
    #[serde(default)]
    pub logic: LogicOperator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self {
            logic: LogicOperator::And,
            conditions,
        }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self {
            logic: LogicOperator::Or,
            conditions,
        }
    }

    /// Group with no leaves; matches every payload
    pub fn always() -> Self {
        Self::default()
    }
}

// ===== Actions =====

/// Kind of side effect an action performs.
///
/// `RemoveTag`, `SendWhatsapp` and `SendWebhook` are reserved names with no
/// handler yet. Names outside the list decode as `Unknown`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    AssignToUser,
    AssignToTeam,
    ChangeStatus,
    AddTag,
    CreateTask,
    SendEmail,
    UpdateField,
    RemoveTag,
    SendWhatsapp,
    SendWebhook,
    Unknown(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AssignToUser => "ASSIGN_TO_USER",
            Self::AssignToTeam => "ASSIGN_TO_TEAM",
            Self::ChangeStatus => "CHANGE_STATUS",
            Self::AddTag => "ADD_TAG",
            Self::CreateTask => "CREATE_TASK",
            Self::SendEmail => "SEND_EMAIL",
            Self::UpdateField => "UPDATE_FIELD",
            Self::RemoveTag => "REMOVE_TAG",
            Self::SendWhatsapp => "SEND_WHATSAPP",
            Self::SendWebhook => "SEND_WEBHOOK",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ActionType {
    fn from(name: String) -> Self {
        match name.to_ascii_uppercase().replace('-', "_").as_str() {
            "ASSIGN_TO_USER" => Self::AssignToUser,
            "ASSIGN_TO_TEAM" => Self::AssignToTeam,
            "CHANGE_STATUS" => Self::ChangeStatus,
            "ADD_TAG" => Self::AddTag,
            "CREATE_TASK" => Self::CreateTask,
            "SEND_EMAIL" => Self::SendEmail,
            "UPDATE_FIELD" => Self::UpdateField,
            "REMOVE_TAG" => Self::RemoveTag,
            "SEND_WHATSAPP" => Self::SendWhatsapp,
            "SEND_WEBHOOK" => Self::SendWebhook,
            _ => Self::Unknown(name),
        }
    }
}

impl From<ActionType> for String {
    fn from(action_type: ActionType) -> Self {
        match action_type {
            ActionType::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// A typed, configurable unit of work run when a workflow's conditions pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ActionSpec {
    /// Build an action; a non-object `config` is replaced by an empty map
    pub fn new(action_type: ActionType, config: Value) -> Self {
        let config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { action_type, config }
    }

    pub fn assign_to_user(user_id: Uuid) -> Self {
        Self::new(ActionType::AssignToUser, serde_json::json!({ "userId": user_id }))
    }

    pub fn assign_to_team(team_id: Uuid) -> Self {
        Self::new(ActionType::AssignToTeam, serde_json::json!({ "teamId": team_id }))
    }

    pub fn change_status(status: &str) -> Self {
        Self::new(ActionType::ChangeStatus, serde_json::json!({ "status": status }))
    }

    pub fn add_tag(tag_id: Uuid) -> Self {
        Self::new(ActionType::AddTag, serde_json::json!({ "tagId": tag_id }))
    }

    pub fn create_task(title: &str, priority: &str, due_in_days: i64) -> Self {
        Self::new(
            ActionType::CreateTask,
            serde_json::json!({
                "title": title,
                "priority": priority,
                "dueInDays": due_in_days
            }),
        )
    }

    pub fn send_email(to: &str, subject: &str, body: &str) -> Self {
        Self::new(
            ActionType::SendEmail,
            serde_json::json!({
                "to": to,
                "subject": subject,
                "body": body
            }),
        )
    }

    pub fn update_field(field_name: &str, field_value: Value) -> Self {
        Self::new(
            ActionType::UpdateField,
            serde_json::json!({
                "fieldName": field_name,
                "fieldValue": field_value
            }),
        )
    }
}

// ===== Workflows =====

/// A persisted automation rule.
///
/// `conditions` and `actions` hold the stored JSON documents; use
/// [`Workflow::condition_group`] and [`Workflow::action_specs`] to decode them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub trigger: TriggerType,
    pub trigger_data: Option<Value>,
    pub conditions: Value,
    pub actions: Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn condition_group(&self) -> Result<ConditionGroup, serde_json::Error> {
        ConditionGroup::deserialize(&self.conditions)
    }

    pub fn action_specs(&self) -> Result<Vec<ActionSpec>, serde_json::Error> {
        Vec::<ActionSpec>::deserialize(&self.actions)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the dispatcher may match this workflow for `trigger`
    pub fn matches(&self, trigger: TriggerType) -> bool {
        self.trigger == trigger && self.is_active && !self.is_deleted()
    }
}

/// Authoring input for a new workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger: TriggerType,
    #[serde(default)]
    pub trigger_data: Option<Value>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub conditions: ConditionGroup,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

impl NewWorkflow {
    pub fn new(name: &str, trigger: TriggerType) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            trigger,
            trigger_data: None,
            is_active: true,
            conditions: ConditionGroup::always(),
            actions: Vec::new(),
            created_by: None,
        }
    }

    pub fn with_conditions(mut self, conditions: ConditionGroup) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_actions(mut self, actions: Vec<ActionSpec>) -> Self {
        self.actions = actions;
        self
    }

    pub fn created_by(mut self, user_id: Uuid) -> Self {
        self.created_by = Some(user_id);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Partial update; conditions and actions are replaced wholesale when present
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger: Option<TriggerType>,
    pub trigger_data: Option<Value>,
    pub is_active: Option<bool>,
    pub conditions: Option<ConditionGroup>,
    pub actions: Option<Vec<ActionSpec>>,
}

// ===== Executions =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Success,
    Skipped,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "SKIPPED" => Ok(Self::Skipped),
            "FAILED" => Ok(Self::Failed),
            other => Err(ParseEnumError {
                kind: "execution status",
                value: other.to_string(),
            }),
        }
    }
}

/// Record of one attempt to run one workflow against one triggering payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Verbatim snapshot of the triggering payload
    pub trigger_data: Value,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds between start and terminal transition
    pub duration_ms: Option<i64>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

// ===== CRM entities touched by actions =====

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub manager_id: Option<Uuid>,
}

/// Task created by the `CREATE_TASK` action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub due_date: Option<DateTime<Utc>>,
    pub lead_id: Option<Uuid>,
    pub deal_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_logic_operator_is_lenient() {
        let group: ConditionGroup = serde_json::from_value(json!({ "conditions": [] })).unwrap();
        assert_eq!(group.logic, LogicOperator::And);

        let group: ConditionGroup =
            serde_json::from_value(json!({ "logic": "or", "conditions": [] })).unwrap();
        assert_eq!(group.logic, LogicOperator::Or);

        let group: ConditionGroup =
            serde_json::from_value(json!({ "logic": 42, "conditions": [] })).unwrap();
        assert_eq!(group.logic, LogicOperator::And);

        assert_eq!(serde_json::to_value(LogicOperator::Or).unwrap(), json!("OR"));
    }

    #[test]
    fn test_unknown_operator_survives_decode() {
        let condition: Condition = serde_json::from_value(json!({
            "field": "status",
            "operator": "MATCHES_REGEX",
            "value": "^N"
        }))
        .unwrap();

        assert_eq!(
            condition.operator,
            ConditionOperator::Unknown("MATCHES_REGEX".to_string())
        );
        assert_eq!(serde_json::to_value(&condition).unwrap()["operator"], "MATCHES_REGEX");
    }

    #[test]
    fn test_malformed_leaves_decode_as_unknown() {
        let group: ConditionGroup = serde_json::from_value(json!({
            "logic": "OR",
            "conditions": [
                { "field": "status" },
                { "field": "status", "operator": 7, "value": "NEW" },
                { "field": "status", "operator": null },
                { "operator": "IS_EMPTY" },
                "status == NEW",
                { "field": "budget", "operator": "GREATER_THAN", "value": 1000 }
            ]
        }))
        .unwrap();

        let leaves = &group.conditions;
        assert_eq!(leaves.len(), 6);
        assert_eq!(leaves[0].operator, ConditionOperator::Unknown(String::new()));
        assert_eq!(leaves[1].operator, ConditionOperator::Unknown("7".to_string()));
        assert_eq!(leaves[1].value, Some(json!("NEW")));
        assert_eq!(leaves[2].operator, ConditionOperator::Unknown("null".to_string()));
        assert_eq!(leaves[3].field, "");
        assert_eq!(leaves[3].operator, ConditionOperator::IsEmpty);
        assert_eq!(leaves[4].field, "");
        assert!(matches!(leaves[4].operator, ConditionOperator::Unknown(_)));
        assert_eq!(leaves[5], Condition::greater_than("budget", json!(1000)));

        // The group shape itself is still required
        assert!(serde_json::from_value::<ConditionGroup>(json!({ "conditions": "status" })).is_err());
    }

    #[test]
    fn test_action_type_names() {
        let spec: ActionSpec = serde_json::from_value(json!({
            "type": "assign-to-team",
            "config": { "teamId": "t1" }
        }))
        .unwrap();
        assert_eq!(spec.action_type, ActionType::AssignToTeam);

        let spec: ActionSpec = serde_json::from_value(json!({ "type": "LAUNCH_ROCKET" })).unwrap();
        assert_eq!(spec.action_type, ActionType::Unknown("LAUNCH_ROCKET".to_string()));
        assert!(spec.config.is_empty());
    }

    #[test]
    fn test_trigger_type_parse() {
        assert_eq!("LEAD_CREATED".parse::<TriggerType>().unwrap(), TriggerType::LeadCreated);
        assert_eq!("deal_won".parse::<TriggerType>().unwrap(), TriggerType::DealWon);
        assert!("LEAD_EXPLODED".parse::<TriggerType>().is_err());
        assert_eq!(
            serde_json::to_value(TriggerType::DealStageChanged).unwrap(),
            json!("DEAL_STAGE_CHANGED")
        );
    }

    #[test]
    fn test_execution_status_round_trip() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::Success,
            ExecutionStatus::Skipped,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_workflow_decodes_stored_documents() {
        let now = Utc::now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            name: "Hot leads".to_string(),
            description: None,
            is_active: true,
            trigger: TriggerType::LeadCreated,
            trigger_data: None,
            conditions: json!({ "logic": "AND", "conditions": [
                { "field": "budget", "operator": "GREATER_THAN", "value": 1000 }
            ]}),
            actions: json!([{ "type": "CHANGE_STATUS", "config": { "status": "QUALIFIED" } }]),
            created_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        assert_eq!(workflow.condition_group().unwrap().conditions.len(), 1);
        assert_eq!(workflow.action_specs().unwrap()[0].action_type, ActionType::ChangeStatus);
        assert!(workflow.matches(TriggerType::LeadCreated));
        assert!(!workflow.matches(TriggerType::DealCreated));

        let broken = Workflow {
            conditions: json!("not a group"),
            ..workflow
        };
        assert!(broken.condition_group().is_err());
    }
}
