// Workflow Automation Engine
//
// Event-driven automation for the CRM: triggers select workflows,
// conditions gate them, and actions mutate leads and deals.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod executor;
pub mod service;
pub mod tracker;
pub mod triggers;

pub use actions::{ActionError, ActionOutcome};
pub use conditions::{evaluate, evaluate_condition};
pub use engine::{DispatchOutcome, ExecutionOutcome, Stores, WorkflowEngine};
pub use executor::ActionExecutor;
pub use service::WorkflowService;
pub use tracker::{CONDITIONS_NOT_MET, ExecutionTracker, RunningExecution};
pub use triggers::{EventPayload, EventSource, TriggerEvent, entity_id, entity_kind, resolve_path};
