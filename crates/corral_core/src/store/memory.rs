//! In-memory store kind.
//!
//! # Responsibility
//! - Provide the no-file, no-batch backend: hash-map tables per entity.
//!
//! # Invariants
//! - Batch delete/update and server-side aggregates report `Unsupported`;
//!   the runner must fall back to the individual mutation strategy.

use crate::model::record::RecordId;
use crate::model::schema::Model;
use crate::model::value::{AttributeMap, Row};
use crate::query::{AggregateFunction, Predicate, SortKey};
use crate::store::tables::{unsupported, TableSet};
use crate::store::{ChangeSet, DurableStore, PendingSave, StoreKind, StoreResult};
use std::sync::Arc;

pub struct MemoryStore {
    tables: TableSet,
}

impl MemoryStore {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            tables: TableSet::empty(&model),
        }
    }
}

impl DurableStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::InMemory
    }

    fn fetch_one(&self, id: &RecordId) -> StoreResult<Option<AttributeMap>> {
        self.tables.fetch_one(id)
    }

    fn fetch_many(
        &self,
        entity: &str,
        predicate: &Predicate,
    ) -> StoreResult<Vec<(RecordId, AttributeMap)>> {
        self.tables.fetch_many(entity, predicate)
    }

    fn fetch_rows(
        &self,
        entity: &str,
        properties: &[String],
        predicate: &Predicate,
        sort: &[SortKey],
        distinct: bool,
    ) -> StoreResult<Vec<Row>> {
        self.tables
            .fetch_rows(entity, properties, predicate, sort, distinct)
    }

    fn count(&self, entity: &str, predicate: &Predicate) -> StoreResult<u64> {
        self.tables.count(entity, predicate)
    }

    fn batch_delete(&mut self, _entity: &str, _predicate: &Predicate) -> StoreResult<Vec<RecordId>> {
        Err(unsupported(self.kind(), "batch delete"))
    }

    fn batch_update(
        &mut self,
        _entity: &str,
        _predicate: &Predicate,
        _attributes: &AttributeMap,
    ) -> StoreResult<Vec<RecordId>> {
        Err(unsupported(self.kind(), "batch update"))
    }

    fn save(&mut self, pending: &PendingSave) -> StoreResult<ChangeSet> {
        self.tables.apply_save(pending)
    }

    fn evaluate_aggregate(
        &self,
        _func: AggregateFunction,
        _entity: &str,
        _property: &str,
        _predicate: &Predicate,
    ) -> StoreResult<Option<Row>> {
        Err(unsupported(self.kind(), "server-side aggregates"))
    }

    fn destroy(&mut self) -> StoreResult<()> {
        self.tables.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::model::record::RecordId;
    use crate::model::schema::{AttributeKind, EntityDescriptor, Model};
    use crate::model::value::Value;
    use crate::query::Predicate;
    use crate::store::{DurableStore, PendingSave, StoreError};
    use std::sync::Arc;

    fn store() -> MemoryStore {
        let model = Model::new(vec![
            EntityDescriptor::new("Person").with_attribute("reg_no", AttributeKind::Integer),
        ]);
        MemoryStore::new(Arc::new(model))
    }

    #[test]
    fn save_then_fetch_roundtrip() {
        let mut store = store();
        let id = RecordId::generate("Person");
        let mut pending = PendingSave::default();
        pending
            .inserts
            .push((id.clone(), [("reg_no".to_string(), Value::Integer(10))].into()));

        let change_set = store.save(&pending).unwrap();
        assert_eq!(change_set.inserted.len(), 1);

        let fetched = store.fetch_one(&id).unwrap().unwrap();
        assert_eq!(fetched.get("reg_no"), Some(&Value::Integer(10)));
        assert_eq!(store.count("Person", &Predicate::All).unwrap(), 1);
    }

    #[test]
    fn batch_operations_are_unsupported() {
        let mut store = store();
        assert!(matches!(
            store.batch_delete("Person", &Predicate::All),
            Err(StoreError::Unsupported { .. })
        ));
        assert!(matches!(
            store.batch_update("Person", &Predicate::All, &Default::default()),
            Err(StoreError::Unsupported { .. })
        ));
    }

    #[test]
    fn unknown_entity_is_reported() {
        let store = store();
        assert!(matches!(
            store.fetch_many("Ghost", &Predicate::All),
            Err(StoreError::UnknownEntity(name)) if name == "Ghost"
        ));
    }
}
