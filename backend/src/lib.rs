//! Workflow automation engine for the Resolve CRM.
//!
//! Domain events are matched against stored workflows, each workflow's
//! conditions are evaluated against the event payload, and passing
//! workflows run their actions against leads and deals. Every attempt is
//! recorded as a workflow execution.

pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod pagination;
pub mod services;
pub mod workflows;

pub use config::{AutomationConfig, Config};
pub use error::{RepositoryError, WorkflowError, WorkflowResult};
pub use workflows::{
    DispatchOutcome, ExecutionOutcome, Stores, TriggerEvent, WorkflowEngine, WorkflowService,
};
