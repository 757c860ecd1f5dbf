//! Preconditions: declarative setup with best-effort rollback

pub mod catalog;
pub mod engine;

pub use catalog::{
    PreconditionCatalog, PreconditionDefinition, PreconditionStep, SafetyPolicy, SlaPolicy, StepValue,
};
pub use engine::{ActionHandler, PreconditionEngine, StepContext, BUILTIN_ACTIONS};
