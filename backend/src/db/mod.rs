pub mod entity_store;
pub mod mock_db;
pub mod postgres_entity_store;
pub mod postgres_workflow_repository;
pub mod workflow_repository;

pub use entity_store::{EntityKind, EntityPatch, EntityStore, MutableField};
pub use mock_db::MockDb;
pub use postgres_entity_store::PostgresEntityStore;
pub use postgres_workflow_repository::PostgresWorkflowRepository;
pub use workflow_repository::{
    ExecutionCompletion, ExecutionRepository, WorkflowFilter, WorkflowRepository,
};
