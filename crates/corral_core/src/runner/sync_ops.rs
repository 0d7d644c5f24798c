//! Blocking operation surface.
//!
//! Every call resolves its target domain (explicit argument, else root),
//! runs the body on that domain's executor and blocks for the result.
//! Calls issued from inside a domain against that same domain run inline.

use crate::domain::DomainHandle;
use crate::model::record::{Record, RecordId};
use crate::model::value::{AttributeMap, Row};
use crate::query::{AggregateFunction, Predicate, SortKey};
use crate::runner::Corral;

impl Corral {
    /// Inserts an empty record without persisting it.
    ///
    /// # Panics
    /// - When `entity` is not declared by the model.
    pub fn insert(&self, entity: &str, domain: Option<&DomainHandle>) -> Record {
        self.insert_with(entity, AttributeMap::new(), false, domain)
    }

    /// Inserts a record with attributes, optionally saving the domain.
    ///
    /// The snapshot is returned even when the requested save fails; the
    /// failure is logged and the changes stay pending.
    ///
    /// # Panics
    /// - When `entity` is not declared by the model.
    pub fn insert_with(
        &self,
        entity: &str,
        attributes: AttributeMap,
        should_save: bool,
        domain: Option<&DomainHandle>,
    ) -> Record {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let current = target.clone();
        target.run_sync(move || {
            let record = runner.insert_on_current(&entity, attributes);
            if should_save {
                runner.save_on_current(&current);
            }
            record
        })
    }

    /// Resolves one record through the domain's pending view.
    pub fn fetch_by_id(&self, id: &RecordId, domain: Option<&DomainHandle>) -> Option<Record> {
        let target = self.target(domain);
        let runner = self.clone();
        let id = id.clone();
        target.run_sync(move || runner.resolve_on_current(&id))
    }

    /// Fetches matching records through the pending view, sorted stably by
    /// the given keys in declaration order.
    pub fn fetch_all(
        &self,
        entity: &str,
        predicate: &Predicate,
        sort: &[SortKey],
        domain: Option<&DomainHandle>,
    ) -> Vec<Record> {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let predicate = predicate.clone();
        let sort = sort.to_vec();
        target.run_sync(move || runner.fetch_all_on_current(&entity, &predicate, &sort))
    }

    /// Fetches raw attribute-projection rows from committed state.
    pub fn fetch_rows(
        &self,
        entity: &str,
        properties: &[String],
        predicate: &Predicate,
        sort: &[SortKey],
        distinct: bool,
        domain: Option<&DomainHandle>,
    ) -> Vec<Row> {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let properties = properties.to_vec();
        let predicate = predicate.clone();
        let sort = sort.to_vec();
        target.run_sync(move || {
            runner.fetch_rows_on_current(&entity, &properties, &predicate, &sort, distinct)
        })
    }

    /// Marks one record deleted. Returns whether a deletion occurred and,
    /// when a save was requested, whether it committed; a second call on the
    /// same identifier returns `false`.
    pub fn delete_by_id(
        &self,
        id: &RecordId,
        should_save: bool,
        domain: Option<&DomainHandle>,
    ) -> bool {
        let target = self.target(domain);
        let runner = self.clone();
        let id = id.clone();
        let current = target.clone();
        target.run_sync(move || {
            let mut deleted = runner.delete_on_current(&id);
            if deleted && should_save {
                deleted = runner.save_on_current(&current);
            }
            deleted
        })
    }

    /// Overlays attributes onto one record. Returns whether it was found
    /// and, when a save was requested, whether it committed.
    pub fn update_by_id(
        &self,
        id: &RecordId,
        attributes: AttributeMap,
        should_save: bool,
        domain: Option<&DomainHandle>,
    ) -> bool {
        let target = self.target(domain);
        let runner = self.clone();
        let id = id.clone();
        let current = target.clone();
        target.run_sync(move || {
            let mut found = runner.update_on_current(&id, &attributes);
            if found && should_save {
                found = runner.save_on_current(&current);
            }
            found
        })
    }

    /// Deletes every record matching the predicate (strategy per the
    /// batch/individual selection rule).
    pub fn delete_all(
        &self,
        entity: &str,
        predicate: &Predicate,
        should_save: bool,
        domain: Option<&DomainHandle>,
    ) -> bool {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let predicate = predicate.clone();
        let current = target.clone();
        target.run_sync(move || {
            runner.delete_all_on_current(&current, &entity, &predicate, should_save)
        })
    }

    /// Applies attributes to every record matching the predicate (strategy
    /// per the batch/individual selection rule).
    pub fn update_all(
        &self,
        entity: &str,
        predicate: &Predicate,
        attributes: AttributeMap,
        should_save: bool,
        domain: Option<&DomainHandle>,
    ) -> bool {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let predicate = predicate.clone();
        let current = target.clone();
        target.run_sync(move || {
            runner.update_all_on_current(&current, &entity, &predicate, &attributes, should_save)
        })
    }

    /// Counts matching records through the pending view. Returns `-1` when
    /// the store query fails.
    pub fn count(&self, entity: &str, predicate: &Predicate, domain: Option<&DomainHandle>) -> i64 {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let predicate = predicate.clone();
        target.run_sync(move || runner.count_on_current(&entity, &predicate))
    }

    /// Evaluates an aggregate over committed state. Returns `None` when the
    /// store kind lacks server-side expressions or the query fails.
    pub fn aggregate(
        &self,
        func: AggregateFunction,
        entity: &str,
        property: &str,
        predicate: &Predicate,
        domain: Option<&DomainHandle>,
    ) -> Option<Row> {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let property = property.to_string();
        let predicate = predicate.clone();
        target.run_sync(move || runner.aggregate_on_current(func, &entity, &property, &predicate))
    }
}
