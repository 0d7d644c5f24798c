//! Confinement-domain persistence wrapper.
//! This crate is the single source of truth for the save/propagate and
//! completion-routing invariants around the durable store kinds.

pub mod domain;
pub mod logging;
pub mod model;
pub mod query;
pub mod runner;
pub mod store;

pub use domain::{DomainHandle, DomainId, MergePolicy};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{
    AttributeDescriptor, AttributeKind, AttributeMap, EntityDescriptor, Model,
    ModelValidationError, Record, RecordId, Row, Value,
};
pub use query::{AggregateFunction, CompareOp, Predicate, SortKey};
pub use runner::{Corral, CorralConfig, OpenError, OperationOptions};
pub use store::{StoreError, StoreKind};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
