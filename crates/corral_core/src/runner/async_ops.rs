//! Asynchronous operation surface with completion routing.
//!
//! Each call queues its body on the target domain and returns immediately.
//! The completion fires per the routing table: on the executing domain, or
//! re-confined to the root domain after the save's change set has been
//! queued there, so root-side delivery observes the merged state.

use crate::domain::DomainHandle;
use crate::model::record::{Record, RecordId};
use crate::model::value::{AttributeMap, Row};
use crate::query::{AggregateFunction, Predicate, SortKey};
use crate::runner::router::{route_mutation, route_read};
use crate::runner::{Corral, OperationOptions};

impl Corral {
    /// Inserts a record with attributes, then routes the completion.
    ///
    /// With root-confined delivery the record is re-resolved on the root
    /// domain; an insert that was not saved is not visible there and the
    /// completion observes `None`.
    ///
    /// # Panics
    /// - When `entity` is not declared by the model (on the target domain's
    ///   executor).
    pub fn insert_async(
        &self,
        entity: &str,
        attributes: AttributeMap,
        options: OperationOptions,
        completion: impl FnOnce(Option<Record>) + Send + 'static,
    ) {
        let target = self.target(options.domain.as_ref());
        let route = route_mutation(
            options.domain.is_some(),
            options.should_save,
            options.complete_on_root,
        );
        let runner = self.clone();
        let entity = entity.to_string();
        let current = target.clone();
        target.run_async(move || {
            let record = runner.insert_on_current(&entity, attributes);
            if route.saves() {
                runner.save_on_current(&current);
            }
            if route.delivers_on_root() {
                runner.deliver_record_on_root(record.id, completion);
            } else {
                completion(Some(record));
            }
        });
    }

    /// Resolves one record and routes the completion per the read table.
    pub fn fetch_by_id_async(
        &self,
        id: &RecordId,
        options: OperationOptions,
        completion: impl FnOnce(Option<Record>) + Send + 'static,
    ) {
        let target = self.target(options.domain.as_ref());
        let route = route_read(options.domain.is_some(), options.complete_on_root);
        let runner = self.clone();
        let id = id.clone();
        target.run_async(move || {
            if route.delivers_on_root() {
                runner.deliver_record_on_root(id, completion);
            } else {
                completion(runner.resolve_on_current(&id));
            }
        });
    }

    /// Fetches matching records and routes the completion per the read
    /// table. Root-confined delivery re-evaluates the fetch on the root
    /// domain so every delivered record is root-owned.
    pub fn fetch_all_async(
        &self,
        entity: &str,
        predicate: &Predicate,
        sort: &[SortKey],
        options: OperationOptions,
        completion: impl FnOnce(Vec<Record>) + Send + 'static,
    ) {
        let target = self.target(options.domain.as_ref());
        let route = route_read(options.domain.is_some(), options.complete_on_root);
        let runner = self.clone();
        let entity = entity.to_string();
        let predicate = predicate.clone();
        let sort = sort.to_vec();
        target.run_async(move || {
            if route.delivers_on_root() {
                let root_runner = runner.clone();
                runner.root_domain().run_async(move || {
                    completion(root_runner.fetch_all_on_current(&entity, &predicate, &sort));
                });
            } else {
                completion(runner.fetch_all_on_current(&entity, &predicate, &sort));
            }
        });
    }

    /// Fetches raw projection rows; plain data, so delivery is always from
    /// the executing domain.
    pub fn fetch_rows_async(
        &self,
        entity: &str,
        properties: &[String],
        predicate: &Predicate,
        sort: &[SortKey],
        distinct: bool,
        domain: Option<&DomainHandle>,
        completion: impl FnOnce(Vec<Row>) + Send + 'static,
    ) {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let properties = properties.to_vec();
        let predicate = predicate.clone();
        let sort = sort.to_vec();
        target.run_async(move || {
            completion(runner.fetch_rows_on_current(&entity, &properties, &predicate, &sort, distinct));
        });
    }

    /// Marks one record deleted and routes the completion. A requested save
    /// that fails is reported as `false`.
    pub fn delete_by_id_async(
        &self,
        id: &RecordId,
        options: OperationOptions,
        completion: impl FnOnce(bool) + Send + 'static,
    ) {
        let target = self.target(options.domain.as_ref());
        let route = route_mutation(
            options.domain.is_some(),
            options.should_save,
            options.complete_on_root,
        );
        let runner = self.clone();
        let id = id.clone();
        let current = target.clone();
        target.run_async(move || {
            let mut deleted = runner.delete_on_current(&id);
            if route.saves() && deleted {
                deleted = runner.save_on_current(&current);
            }
            if route.delivers_on_root() {
                runner.deliver_on_root(move || completion(deleted));
            } else {
                completion(deleted);
            }
        });
    }

    /// Overlays attributes onto one record and routes the completion. A
    /// requested save that fails is reported as `false`.
    pub fn update_by_id_async(
        &self,
        id: &RecordId,
        attributes: AttributeMap,
        options: OperationOptions,
        completion: impl FnOnce(bool) + Send + 'static,
    ) {
        let target = self.target(options.domain.as_ref());
        let route = route_mutation(
            options.domain.is_some(),
            options.should_save,
            options.complete_on_root,
        );
        let runner = self.clone();
        let id = id.clone();
        let current = target.clone();
        target.run_async(move || {
            let mut found = runner.update_on_current(&id, &attributes);
            if route.saves() && found {
                found = runner.save_on_current(&current);
            }
            if route.delivers_on_root() {
                runner.deliver_on_root(move || completion(found));
            } else {
                completion(found);
            }
        });
    }

    /// Deletes every matching record (batch/individual strategy) and routes
    /// the completion. The strategy performs the save itself when requested.
    pub fn delete_all_async(
        &self,
        entity: &str,
        predicate: &Predicate,
        options: OperationOptions,
        completion: impl FnOnce(bool) + Send + 'static,
    ) {
        let target = self.target(options.domain.as_ref());
        let route = route_mutation(
            options.domain.is_some(),
            options.should_save,
            options.complete_on_root,
        );
        let runner = self.clone();
        let entity = entity.to_string();
        let predicate = predicate.clone();
        let should_save = options.should_save;
        let current = target.clone();
        target.run_async(move || {
            let ok = runner.delete_all_on_current(&current, &entity, &predicate, should_save);
            if route.delivers_on_root() {
                runner.deliver_on_root(move || completion(ok));
            } else {
                completion(ok);
            }
        });
    }

    /// Applies attributes to every matching record (batch/individual
    /// strategy) and routes the completion.
    pub fn update_all_async(
        &self,
        entity: &str,
        predicate: &Predicate,
        attributes: AttributeMap,
        options: OperationOptions,
        completion: impl FnOnce(bool) + Send + 'static,
    ) {
        let target = self.target(options.domain.as_ref());
        let route = route_mutation(
            options.domain.is_some(),
            options.should_save,
            options.complete_on_root,
        );
        let runner = self.clone();
        let entity = entity.to_string();
        let predicate = predicate.clone();
        let should_save = options.should_save;
        let current = target.clone();
        target.run_async(move || {
            let ok = runner.update_all_on_current(
                &current,
                &entity,
                &predicate,
                &attributes,
                should_save,
            );
            if route.delivers_on_root() {
                runner.deliver_on_root(move || completion(ok));
            } else {
                completion(ok);
            }
        });
    }

    /// Counts matching records through the pending view; `-1` on store
    /// failure. Delivered from the executing domain.
    pub fn count_async(
        &self,
        entity: &str,
        predicate: &Predicate,
        domain: Option<&DomainHandle>,
        completion: impl FnOnce(i64) + Send + 'static,
    ) {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let predicate = predicate.clone();
        target.run_async(move || completion(runner.count_on_current(&entity, &predicate)));
    }

    /// Evaluates an aggregate over committed state; `None` when the kind
    /// lacks server-side expressions or the query fails. Delivered from the
    /// executing domain.
    pub fn aggregate_async(
        &self,
        func: AggregateFunction,
        entity: &str,
        property: &str,
        predicate: &Predicate,
        domain: Option<&DomainHandle>,
        completion: impl FnOnce(Option<Row>) + Send + 'static,
    ) {
        let target = self.target(domain);
        let runner = self.clone();
        let entity = entity.to_string();
        let property = property.to_string();
        let predicate = predicate.clone();
        target.run_async(move || {
            completion(runner.aggregate_on_current(func, &entity, &property, &predicate));
        });
    }

    /// Persists a domain's pending changes without blocking the caller; the
    /// completion fires on the saving domain's executor after the store save
    /// and change-set fan-out.
    pub fn save_domain_async(
        &self,
        domain: Option<&DomainHandle>,
        completion: impl FnOnce(bool) + Send + 'static,
    ) {
        let target = self.target(domain);
        let runner = self.clone();
        let current = target.clone();
        target.run_async(move || completion(runner.save_on_current(&current)));
    }

    /// Queues a re-resolution of `id` on the root domain and delivers the
    /// root-owned snapshot from there.
    fn deliver_record_on_root(
        &self,
        id: RecordId,
        completion: impl FnOnce(Option<Record>) + Send + 'static,
    ) {
        let runner = self.clone();
        self.root_domain()
            .run_async(move || completion(runner.resolve_on_current(&id)));
    }

    /// Queues a completion onto the root domain's executor.
    fn deliver_on_root(&self, job: impl FnOnce() + Send + 'static) {
        self.root_domain().run_async(job);
    }
}
