// Common test utilities that are shared across integration tests
#![allow(dead_code)]

use chrono::Utc;
use resolve_automation::db::{EntityKind, MockDb};
use resolve_automation::{AutomationConfig, Stores, WorkflowService};
use resolve_shared::{TriggerType, Workflow};
use serde_json::{Value, json};
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok();
    });
}

/// Service wired to a fresh in-memory store
pub struct Harness {
    pub db: Arc<MockDb>,
    pub service: WorkflowService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AutomationConfig::default())
    }

    pub fn with_config(config: AutomationConfig) -> Self {
        init_test_logging();
        let db = Arc::new(MockDb::new());
        let service = WorkflowService::new(Stores::in_memory(db.clone()), config);
        Self { db, service }
    }

    /// Seed a lead and return a payload describing it
    pub fn lead(&self, fields: Value) -> (Uuid, Value) {
        let id = Uuid::new_v4();
        self.db.insert_entity(EntityKind::Lead, id, fields.clone());

        let mut payload = fields;
        if let Value::Object(map) = &mut payload {
            map.insert("id".into(), json!(id.to_string()));
            map.insert("entityType".into(), json!("lead"));
        }
        (id, payload)
    }

    /// Store a workflow with raw condition and action documents
    pub fn raw_workflow(&self, trigger: TriggerType, conditions: Value, actions: Value) -> Workflow {
        let now = Utc::now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            name: "Imported".to_string(),
            description: None,
            is_active: true,
            trigger,
            trigger_data: None,
            conditions,
            actions,
            created_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.db.insert_workflow_record(workflow.clone());
        workflow
    }

    /// Store a workflow whose conditions document cannot be decoded
    pub fn broken_workflow(&self, trigger: TriggerType) -> Workflow {
        self.raw_workflow(trigger, json!("status == NEW"), json!([]))
    }
}
