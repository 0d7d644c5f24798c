//! Record identity and snapshot types.
//!
//! # Responsibility
//! - Define the stable record identifier handed out at insert time.
//! - Define the record snapshot delivered to callers, stamped with the
//!   confinement domain that produced it.
//!
//! # Invariants
//! - A `RecordId` value never changes once assigned; it becomes resolvable
//!   outside its owning domain only after that domain's save commits.
//! - `Record::owner` always names the domain whose executor resolved the
//!   snapshot, so completion-routing outcomes are observable.

use crate::domain::DomainId;
use crate::model::value::AttributeMap;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one record: entity name plus a UUID key.
///
/// The entity name travels with the key so single-id operations
/// (`fetch_by_id`, `delete_by_id`, `update_by_id`) need no extra type
/// argument, mirroring store identifiers that encode their entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    entity: String,
    key: Uuid,
}

impl RecordId {
    /// Assigns a fresh identifier for a newly inserted record.
    pub(crate) fn generate(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            key: Uuid::new_v4(),
        }
    }

    /// Rebuilds an identifier from its parts (store load paths).
    pub(crate) fn from_parts(entity: &str, key: Uuid) -> Self {
        Self {
            entity: entity.to_string(),
            key,
        }
    }

    /// Entity this identifier belongs to.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// UUID key within the entity.
    pub fn key(&self) -> Uuid {
        self.key
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity, self.key)
    }
}

/// Snapshot of one record as seen by a confinement domain.
///
/// Snapshots are plain values; mutating one has no effect on the domain's
/// working set. All mutation goes through wrapper operations, which execute
/// on the owning domain's serial executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub attributes: AttributeMap,
    owner: DomainId,
}

impl Record {
    pub(crate) fn new(id: RecordId, attributes: AttributeMap, owner: DomainId) -> Self {
        Self {
            id,
            attributes,
            owner,
        }
    }

    /// Entity of this record.
    pub fn entity(&self) -> &str {
        self.id.entity()
    }

    /// The confinement domain that produced this snapshot.
    pub fn owner(&self) -> DomainId {
        self.owner
    }

    /// Convenience attribute lookup.
    pub fn attribute(&self, name: &str) -> Option<&crate::model::value::Value> {
        self.attributes.get(name)
    }
}
