//! Operation runner: session handle, save/propagate and mutation strategy.
//!
//! # Responsibility
//! - Open a store session: validate the model, open the backend, spawn the
//!   root confinement domain.
//! - Execute every CRUD/count/aggregate primitive on the correct domain and
//!   route its completion per the decision table.
//! - Choose between batch and individual mutation for delete-all/update-all.
//! - Propagate change sets from a saved domain into every other live domain.
//!
//! # Invariants
//! - Store failures are converted into the operation's normal result channel
//!   (`None`, `false`, `-1`, empty) and logged; they never panic and are
//!   never silently dropped.
//! - A save's change set is queued into the other domains before any
//!   root-confined delivery, so re-resolution observes the merged state.
//! - The batch path never materializes records in memory; it merges the
//!   affected identifiers into every live domain instead.

mod async_ops;
mod router;
mod sync_ops;

use crate::domain::{with_state, DomainHandle, DomainId, DomainRegistry, MergePolicy};
use crate::model::record::{Record, RecordId};
use crate::model::schema::{Model, ModelValidationError};
use crate::model::value::{AttributeMap, Row};
use crate::query::{AggregateFunction, Predicate, SortKey};
use crate::store::{open_store, ChangeSet, SharedStore, StoreError, StoreKind};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

/// Session configuration handed to [`Corral::open`].
#[derive(Debug, Clone)]
pub struct CorralConfig {
    pub model: Model,
    pub store_kind: StoreKind,
    /// Base file name for file-backed kinds; the kind appends its extension.
    pub database_file_name: String,
    /// Directory holding the database file. Required for file-backed kinds.
    pub store_dir: Option<PathBuf>,
    pub merge_policy: MergePolicy,
}

impl CorralConfig {
    pub fn new(model: Model, store_kind: StoreKind) -> Self {
        Self {
            model,
            store_kind,
            database_file_name: "corral".to_string(),
            store_dir: None,
            merge_policy: MergePolicy::default(),
        }
    }

    pub fn with_database_file_name(mut self, name: impl Into<String>) -> Self {
        self.database_file_name = name.into();
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }
}

/// Failures during session construction. All of them are unrecoverable for
/// the session; nothing is partially opened.
#[derive(Debug)]
pub enum OpenError {
    Model(ModelValidationError),
    Store(StoreError),
    Domain(std::io::Error),
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model(err) => write!(f, "invalid model: {err}"),
            Self::Store(err) => write!(f, "store open failed: {err}"),
            Self::Domain(err) => write!(f, "root domain spawn failed: {err}"),
        }
    }
}

impl Error for OpenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Model(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Domain(err) => Some(err),
        }
    }
}

impl From<ModelValidationError> for OpenError {
    fn from(value: ModelValidationError) -> Self {
        Self::Model(value)
    }
}

impl From<StoreError> for OpenError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Per-call options for asynchronous operations.
///
/// The three fields are the routing axes of the decision table; read-only
/// operations ignore `should_save`.
#[derive(Clone, Default)]
pub struct OperationOptions {
    /// Target domain; the root domain when absent.
    pub domain: Option<DomainHandle>,
    pub should_save: bool,
    pub complete_on_root: bool,
}

impl OperationOptions {
    pub fn on(domain: &DomainHandle) -> Self {
        Self {
            domain: Some(domain.clone()),
            ..Self::default()
        }
    }

    pub fn saving(mut self) -> Self {
        self.should_save = true;
        self
    }

    pub fn completing_on_root(mut self) -> Self {
        self.complete_on_root = true;
        self
    }
}

/// Handle to one open store session.
///
/// Cloning is cheap; every clone shares the same store, domains and merge
/// policy. The session shuts down when the last clone and the last derived
/// domain handle drop.
#[derive(Clone)]
pub struct Corral {
    model: Arc<Model>,
    store: SharedStore,
    registry: Arc<DomainRegistry>,
    kind: StoreKind,
    merge_policy: MergePolicy,
}

impl Corral {
    /// Opens the store and spawns the root confinement domain.
    ///
    /// # Errors
    /// - [`OpenError::Model`] when the model fails validation.
    /// - [`OpenError::Store`] when the backend cannot be opened.
    /// - [`OpenError::Domain`] when the root executor thread cannot spawn.
    pub fn open(config: CorralConfig) -> Result<Self, OpenError> {
        config.model.validate()?;
        let model = Arc::new(config.model);
        let store = open_store(
            config.store_kind,
            model.clone(),
            &config.database_file_name,
            config.store_dir.as_ref(),
        )?;
        let root = DomainHandle::spawn("root").map_err(OpenError::Domain)?;
        info!(
            "event=session_open module=runner kind={} root={}",
            config.store_kind,
            root.id()
        );
        Ok(Self {
            model,
            store: SharedStore::new(store),
            registry: Arc::new(DomainRegistry::new(root)),
            kind: config.store_kind,
            merge_policy: config.merge_policy,
        })
    }

    pub fn store_kind(&self) -> StoreKind {
        self.kind
    }

    /// The session's root confinement domain.
    pub fn root_domain(&self) -> DomainHandle {
        self.registry.root().clone()
    }

    /// Spawns a derived domain and registers it for change-set fan-out.
    ///
    /// The domain lives until its last handle drops.
    pub fn new_derived_domain(&self) -> std::io::Result<DomainHandle> {
        let handle = DomainHandle::spawn("derived")?;
        self.registry.register(&handle);
        info!(
            "event=domain_derived module=runner id={} root={}",
            handle.id(),
            self.registry.root().id()
        );
        Ok(handle)
    }

    fn target(&self, domain: Option<&DomainHandle>) -> DomainHandle {
        domain.cloned().unwrap_or_else(|| self.root_domain())
    }

    // Domain-confined primitives. Every method below must run on the
    // executing domain's own thread (`with_state` enforces it).

    pub(crate) fn insert_on_current(&self, entity: &str, attributes: AttributeMap) -> Record {
        if self.model.entity(entity).is_none() {
            panic!("insert into undeclared entity `{entity}`");
        }
        with_state(|state| state.insert(entity, attributes))
    }

    pub(crate) fn resolve_on_current(&self, id: &RecordId) -> Option<Record> {
        let store = self.store.clone();
        match with_state(|state| state.resolve(id, &store)) {
            Ok(record) => record,
            Err(err) => {
                self.log_store_error("fetch_by_id", &err);
                None
            }
        }
    }

    pub(crate) fn fetch_all_on_current(
        &self,
        entity: &str,
        predicate: &Predicate,
        sort: &[SortKey],
    ) -> Vec<Record> {
        let store = self.store.clone();
        match with_state(|state| state.fetch_all(entity, predicate, sort, &store)) {
            Ok(records) => records,
            Err(err) => {
                self.log_store_error("fetch_all", &err);
                Vec::new()
            }
        }
    }

    /// Raw projection rows come straight from committed state; the pending
    /// view does not apply to them.
    pub(crate) fn fetch_rows_on_current(
        &self,
        entity: &str,
        properties: &[String],
        predicate: &Predicate,
        sort: &[SortKey],
        distinct: bool,
    ) -> Vec<Row> {
        let result = self
            .store
            .lock()
            .fetch_rows(entity, properties, predicate, sort, distinct);
        match result {
            Ok(rows) => rows,
            Err(err) => {
                self.log_store_error("fetch_rows", &err);
                Vec::new()
            }
        }
    }

    pub(crate) fn count_on_current(&self, entity: &str, predicate: &Predicate) -> i64 {
        let store = self.store.clone();
        match with_state(|state| state.count_view(entity, predicate, &store)) {
            Ok(count) => count as i64,
            Err(err) => {
                self.log_store_error("count", &err);
                -1
            }
        }
    }

    pub(crate) fn aggregate_on_current(
        &self,
        func: AggregateFunction,
        entity: &str,
        property: &str,
        predicate: &Predicate,
    ) -> Option<Row> {
        if !self.kind.supports_server_aggregates() {
            warn!(
                "event=aggregate module=runner kind={} func={} status=unsupported",
                self.kind,
                func.name()
            );
            return None;
        }
        let result = self
            .store
            .lock()
            .evaluate_aggregate(func, entity, property, predicate);
        match result {
            Ok(row) => row,
            Err(err) => {
                self.log_store_error("aggregate", &err);
                None
            }
        }
    }

    pub(crate) fn update_on_current(&self, id: &RecordId, attributes: &AttributeMap) -> bool {
        let store = self.store.clone();
        match with_state(|state| state.update(id, attributes, &store)) {
            Ok(found) => found,
            Err(err) => {
                self.log_store_error("update_by_id", &err);
                false
            }
        }
    }

    pub(crate) fn delete_on_current(&self, id: &RecordId) -> bool {
        let store = self.store.clone();
        match with_state(|state| state.delete(id, &store)) {
            Ok(deleted) => deleted,
            Err(err) => {
                self.log_store_error("delete_by_id", &err);
                false
            }
        }
    }

    /// Saves the executing domain's pending changes and fans the change set
    /// out to every other live domain.
    pub(crate) fn save_on_current(&self, current: &DomainHandle) -> bool {
        let pending = with_state(|state| state.pending_save());
        if pending.is_empty() {
            return true;
        }
        let result = { self.store.lock().save(&pending) };
        match result {
            Ok(change_set) => {
                with_state(|state| state.after_save());
                info!(
                    "event=save module=runner domain={} inserted={} updated={} deleted={} status=ok",
                    current.id(),
                    change_set.inserted.len(),
                    change_set.updated.len(),
                    change_set.deleted.len()
                );
                self.merge_into_others(current.id(), change_set, self.merge_policy);
                true
            }
            Err(err) => {
                error!(
                    "event=save module=runner domain={} status=error error={err}",
                    current.id()
                );
                false
            }
        }
    }

    /// Deletes every matching record, choosing the batch or individual
    /// strategy.
    ///
    /// Batch requires a batch-capable kind *and* an immediate save; the
    /// identifiers it affects are merged into all live domains without ever
    /// materializing the records. The individual path registers each match
    /// as deleted and relies on the ordinary save path.
    pub(crate) fn delete_all_on_current(
        &self,
        current: &DomainHandle,
        entity: &str,
        predicate: &Predicate,
        should_save: bool,
    ) -> bool {
        if self.kind.supports_batch() && should_save {
            let result = { self.store.lock().batch_delete(entity, predicate) };
            match result {
                Ok(ids) => {
                    let ok = !ids.is_empty();
                    info!(
                        "event=delete_all module=runner domain={} strategy=batch affected={}",
                        current.id(),
                        ids.len()
                    );
                    let change_set = ChangeSet {
                        deleted: ids,
                        ..ChangeSet::default()
                    };
                    self.merge_batch_result(current, change_set);
                    ok
                }
                Err(err) => {
                    self.log_store_error("delete_all", &err);
                    false
                }
            }
        } else {
            let store = self.store.clone();
            let matches = match with_state(|state| state.fetch_all(entity, predicate, &[], &store))
            {
                Ok(records) => records,
                Err(err) => {
                    self.log_store_error("delete_all", &err);
                    return false;
                }
            };
            info!(
                "event=delete_all module=runner domain={} strategy=individual affected={}",
                current.id(),
                matches.len()
            );
            for record in &matches {
                self.delete_on_current(&record.id);
            }
            if should_save {
                self.save_on_current(current)
            } else {
                true
            }
        }
    }

    /// Updates every matching record, choosing the batch or individual
    /// strategy. Same selection rule as [`Self::delete_all_on_current`].
    pub(crate) fn update_all_on_current(
        &self,
        current: &DomainHandle,
        entity: &str,
        predicate: &Predicate,
        attributes: &AttributeMap,
        should_save: bool,
    ) -> bool {
        if self.kind.supports_batch() && should_save {
            let result = { self.store.lock().batch_update(entity, predicate, attributes) };
            match result {
                Ok(ids) => {
                    let ok = !ids.is_empty();
                    info!(
                        "event=update_all module=runner domain={} strategy=batch affected={}",
                        current.id(),
                        ids.len()
                    );
                    let change_set = ChangeSet {
                        updated: ids,
                        ..ChangeSet::default()
                    };
                    self.merge_batch_result(current, change_set);
                    ok
                }
                Err(err) => {
                    self.log_store_error("update_all", &err);
                    false
                }
            }
        } else {
            let store = self.store.clone();
            let matches = match with_state(|state| state.fetch_all(entity, predicate, &[], &store))
            {
                Ok(records) => records,
                Err(err) => {
                    self.log_store_error("update_all", &err);
                    return false;
                }
            };
            info!(
                "event=update_all module=runner domain={} strategy=individual affected={}",
                current.id(),
                matches.len()
            );
            for record in &matches {
                self.update_on_current(&record.id, attributes);
            }
            if should_save {
                self.save_on_current(current)
            } else {
                true
            }
        }
    }

    /// Applies a batch mutation's change set to the executing domain inline
    /// and to every other live domain on its own executor. Batch results are
    /// committed state, so they merge with store-trump semantics.
    fn merge_batch_result(&self, current: &DomainHandle, change_set: ChangeSet) {
        let store = self.store.clone();
        if let Err(err) =
            with_state(|state| state.merge(&change_set, MergePolicy::StoreTrump, &store))
        {
            self.log_store_error("merge", &err);
        }
        self.merge_into_others(current.id(), change_set, MergePolicy::StoreTrump);
    }

    /// Queues a merge of `change_set` onto every live domain except `source`.
    fn merge_into_others(&self, source: DomainId, change_set: ChangeSet, policy: MergePolicy) {
        if change_set.is_empty() {
            return;
        }
        for domain in self.registry.live_domains() {
            if domain.id() == source {
                continue;
            }
            let store = self.store.clone();
            let change_set = change_set.clone();
            let target = domain.id();
            domain.run_async(move || {
                if let Err(err) = with_state(|state| state.merge(&change_set, policy, &store)) {
                    error!(
                        "event=merge module=runner domain={target} status=error error={err}"
                    );
                }
            });
        }
    }

    fn log_store_error(&self, operation: &str, err: &StoreError) {
        error!(
            "event={operation} module=runner kind={} status=error error={err}",
            self.kind
        );
    }

    // Session-level maintenance.

    /// Persists the root domain's pending changes. Blocks until durable.
    pub fn save_root(&self) -> bool {
        self.save_domain(None)
    }

    /// Persists a domain's pending changes. Blocks until durable.
    pub fn save_domain(&self, domain: Option<&DomainHandle>) -> bool {
        let target = self.target(domain);
        let runner = self.clone();
        let current = target.clone();
        target.run_sync(move || runner.save_on_current(&current))
    }

    /// Discards a domain's pending changes, restoring its committed view.
    pub fn revert(&self, domain: Option<&DomainHandle>) {
        let target = self.target(domain);
        target.run_sync(|| with_state(|state| state.revert()));
    }

    /// Evicts everything a domain has registered, pending or clean.
    pub fn reset(&self, domain: Option<&DomainHandle>) {
        let target = self.target(domain);
        target.run_sync(|| with_state(|state| state.reset()));
    }

    /// Whether a domain holds unsaved changes.
    pub fn has_changes(&self, domain: Option<&DomainHandle>) -> bool {
        let target = self.target(domain);
        target.run_sync(|| with_state(|state| state.has_changes()))
    }

    /// Destroys the underlying store files and evicts every domain's
    /// working set. Refused for the in-memory kind, which has no files.
    pub fn purge_store(&self) -> bool {
        if self.kind == StoreKind::InMemory {
            warn!("event=purge module=runner kind={} status=refused", self.kind);
            return false;
        }
        let store = self.store.clone();
        let destroyed = self
            .root_domain()
            .run_sync(move || store.lock().destroy());
        match destroyed {
            Ok(()) => {
                for domain in self.registry.live_domains() {
                    domain.run_async(|| with_state(|state| state.reset()));
                }
                info!("event=purge module=runner kind={} status=ok", self.kind);
                true
            }
            Err(err) => {
                error!(
                    "event=purge module=runner kind={} status=error error={err}",
                    self.kind
                );
                false
            }
        }
    }
}
