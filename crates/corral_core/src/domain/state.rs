//! Per-domain working set of registered records.
//!
//! # Responsibility
//! - Track the records a domain has inserted, resolved, updated or deleted
//!   since its last save.
//! - Answer fetches and counts through the pending view: committed rows
//!   overlaid with this domain's registered changes.
//!
//! # Invariants
//! - Every method runs on the owning domain's executor thread (reached via
//!   `with_state`), so no locking is needed here.
//! - A record inserted and then deleted before a save never reaches the
//!   store.
//! - `pending_save` and `after_save` bracket exactly one store save.

use crate::domain::DomainId;
use crate::model::record::{Record, RecordId};
use crate::model::value::AttributeMap;
use crate::query::{compare_by_sort_keys, Predicate, SortKey};
use crate::store::{ChangeSet, PendingSave, SharedStore, StoreResult};
use std::collections::HashMap;

/// How a registered record differs from committed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordStatus {
    Clean,
    Inserted,
    Updated,
    Deleted,
}

#[derive(Debug, Clone)]
struct Registered {
    attributes: AttributeMap,
    status: RecordStatus,
}

/// Which side wins when a merged change collides with a local pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Local pending changes survive the merge.
    #[default]
    ObjectTrump,
    /// Committed state replaces local pending changes.
    StoreTrump,
}

pub(crate) struct DomainState {
    id: DomainId,
    registered: HashMap<RecordId, Registered>,
}

impl DomainState {
    pub(crate) fn new(id: DomainId) -> Self {
        Self {
            id,
            registered: HashMap::new(),
        }
    }

    /// Registers a brand-new record and hands back its snapshot.
    pub(crate) fn insert(&mut self, entity: &str, attributes: AttributeMap) -> Record {
        let id = RecordId::generate(entity);
        self.registered.insert(
            id.clone(),
            Registered {
                attributes: attributes.clone(),
                status: RecordStatus::Inserted,
            },
        );
        Record::new(id, attributes, self.id)
    }

    /// Resolves one record through the pending view.
    ///
    /// A committed record gets registered as `Clean` on first resolution, so
    /// later merges can refresh or evict it.
    pub(crate) fn resolve(&mut self, id: &RecordId, store: &SharedStore) -> StoreResult<Option<Record>> {
        if let Some(registered) = self.registered.get(id) {
            return Ok(match registered.status {
                RecordStatus::Deleted => None,
                _ => Some(Record::new(id.clone(), registered.attributes.clone(), self.id)),
            });
        }
        match store.lock().fetch_one(id)? {
            Some(attributes) => {
                self.registered.insert(
                    id.clone(),
                    Registered {
                        attributes: attributes.clone(),
                        status: RecordStatus::Clean,
                    },
                );
                Ok(Some(Record::new(id.clone(), attributes, self.id)))
            }
            None => Ok(None),
        }
    }

    /// Fetches every record of `entity` matching `predicate`, through the
    /// pending view, sorted by `sort`.
    ///
    /// With no pending changes for the entity the predicate is pushed down
    /// to the store; otherwise committed rows are fetched wholesale and
    /// filtered here, since pending updates can change what matches.
    pub(crate) fn fetch_all(
        &mut self,
        entity: &str,
        predicate: &Predicate,
        sort: &[SortKey],
        store: &SharedStore,
    ) -> StoreResult<Vec<Record>> {
        let mut rows: Vec<(RecordId, AttributeMap)> = if self.entity_has_changes(entity) {
            let committed = store.lock().fetch_many(entity, &Predicate::All)?;
            let mut rows = Vec::with_capacity(committed.len());
            for (id, attributes) in committed {
                match self.registered.get(&id) {
                    Some(registered) if registered.status == RecordStatus::Deleted => continue,
                    Some(registered) => rows.push((id, registered.attributes.clone())),
                    None => rows.push((id, attributes)),
                }
            }
            for (id, registered) in &self.registered {
                if id.entity() == entity && registered.status == RecordStatus::Inserted {
                    rows.push((id.clone(), registered.attributes.clone()));
                }
            }
            rows.retain(|(_, attributes)| predicate.matches(attributes));
            rows
        } else {
            store.lock().fetch_many(entity, predicate)?
        };

        rows.sort_by(|(_, a), (_, b)| compare_by_sort_keys(a, b, sort));
        let records = rows
            .into_iter()
            .map(|(id, attributes)| {
                self.registered.entry(id.clone()).or_insert(Registered {
                    attributes: attributes.clone(),
                    status: RecordStatus::Clean,
                });
                Record::new(id, attributes, self.id)
            })
            .collect();
        Ok(records)
    }

    /// Counts records matching `predicate` through the pending view.
    pub(crate) fn count_view(
        &mut self,
        entity: &str,
        predicate: &Predicate,
        store: &SharedStore,
    ) -> StoreResult<u64> {
        if self.entity_has_changes(entity) {
            Ok(self.fetch_all(entity, predicate, &[], store)?.len() as u64)
        } else {
            store.lock().count(entity, predicate)
        }
    }

    /// Overlays `attributes` onto one record. Returns whether it existed.
    pub(crate) fn update(
        &mut self,
        id: &RecordId,
        attributes: &AttributeMap,
        store: &SharedStore,
    ) -> StoreResult<bool> {
        if self.resolve(id, store)?.is_none() {
            return Ok(false);
        }
        let registered = self
            .registered
            .get_mut(id)
            .ok_or(crate::store::StoreError::InvalidData(
                "resolved record vanished from the working set".to_string(),
            ))?;
        for (name, value) in attributes {
            registered.attributes.insert(name.clone(), value.clone());
        }
        if registered.status == RecordStatus::Clean || registered.status == RecordStatus::Updated {
            registered.status = RecordStatus::Updated;
        }
        Ok(true)
    }

    /// Marks one record deleted. Returns whether it existed.
    ///
    /// Deleting a not-yet-saved insert unregisters it outright.
    pub(crate) fn delete(&mut self, id: &RecordId, store: &SharedStore) -> StoreResult<bool> {
        if self.resolve(id, store)?.is_none() {
            return Ok(false);
        }
        let status = self.registered.get(id).map(|registered| registered.status);
        match status {
            Some(RecordStatus::Inserted) => {
                self.registered.remove(id);
            }
            Some(_) => {
                if let Some(registered) = self.registered.get_mut(id) {
                    registered.status = RecordStatus::Deleted;
                }
            }
            None => {}
        }
        Ok(true)
    }

    /// Whether any registered record diverges from committed state.
    pub(crate) fn has_changes(&self) -> bool {
        self.registered
            .values()
            .any(|registered| registered.status != RecordStatus::Clean)
    }

    fn entity_has_changes(&self, entity: &str) -> bool {
        self.registered
            .iter()
            .any(|(id, registered)| id.entity() == entity && registered.status != RecordStatus::Clean)
    }

    /// Collects the pending changes for a store save.
    pub(crate) fn pending_save(&self) -> PendingSave {
        let mut pending = PendingSave::default();
        for (id, registered) in &self.registered {
            match registered.status {
                RecordStatus::Clean => {}
                RecordStatus::Inserted => pending
                    .inserts
                    .push((id.clone(), registered.attributes.clone())),
                RecordStatus::Updated => pending
                    .updates
                    .push((id.clone(), registered.attributes.clone())),
                RecordStatus::Deleted => pending.deletes.push(id.clone()),
            }
        }
        pending
    }

    /// Settles the working set after its pending changes committed.
    pub(crate) fn after_save(&mut self) {
        self.registered
            .retain(|_, registered| registered.status != RecordStatus::Deleted);
        for registered in self.registered.values_mut() {
            registered.status = RecordStatus::Clean;
        }
    }

    /// Drops pending changes, restoring the committed view.
    ///
    /// Updated and deleted records are evicted rather than restored; the
    /// next resolution refetches their committed attributes.
    pub(crate) fn revert(&mut self) {
        self.registered
            .retain(|_, registered| registered.status == RecordStatus::Clean);
    }

    /// Evicts every registered record, pending or clean.
    pub(crate) fn reset(&mut self) {
        self.registered.clear();
    }

    /// Applies another domain's committed change set to this working set.
    ///
    /// Only registered records are touched; unregistered identifiers are
    /// picked up naturally on the next fetch. Under `ObjectTrump` a local
    /// pending change survives the merge; under `StoreTrump` committed state
    /// wins.
    pub(crate) fn merge(
        &mut self,
        change_set: &ChangeSet,
        policy: MergePolicy,
        store: &SharedStore,
    ) -> StoreResult<()> {
        for id in change_set.inserted.iter().chain(change_set.updated.iter()) {
            let Some(registered) = self.registered.get(id) else {
                continue;
            };
            if policy == MergePolicy::ObjectTrump && registered.status != RecordStatus::Clean {
                continue;
            }
            match store.lock().fetch_one(id)? {
                Some(attributes) => {
                    self.registered.insert(
                        id.clone(),
                        Registered {
                            attributes,
                            status: RecordStatus::Clean,
                        },
                    );
                }
                None => {
                    self.registered.remove(id);
                }
            }
        }
        for id in &change_set.deleted {
            let Some(registered) = self.registered.get(id) else {
                continue;
            };
            if policy == MergePolicy::ObjectTrump && registered.status != RecordStatus::Clean {
                continue;
            }
            self.registered.remove(id);
        }
        Ok(())
    }
}
