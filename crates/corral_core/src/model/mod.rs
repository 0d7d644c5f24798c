//! Record, value and schema model types.
//!
//! # Responsibility
//! - Define the canonical data shapes shared by domains, stores and the
//!   operation runner.

pub mod record;
pub mod schema;
pub mod value;

pub use record::{Record, RecordId};
pub use schema::{
    AttributeDescriptor, AttributeKind, EntityDescriptor, Model, ModelValidationError,
    RECORD_ID_ATTRIBUTE,
};
pub use value::{AttributeMap, Row, Value};
