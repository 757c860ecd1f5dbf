//! Signal definitions and the catalog that holds them
//!
//! The catalog is loaded from YAML and shared read-only between the broker
//! and the precondition engine.

pub mod catalog;

// Re-export key types for convenience
pub use catalog::{PayloadDefinition, PayloadKind, SignalCatalog, SignalDefinition};
