//! Durable store contracts and backend selection.
//!
//! # Responsibility
//! - Define the narrow interface the operation runner consumes from any
//!   durable store kind.
//! - Open the configured backend and report capability differences.
//!
//! # Invariants
//! - Batch delete/update and server-side aggregates are only offered by
//!   batch-capable kinds; others report `Unsupported` instead of emulating.
//! - `save` applies one domain's pending changes atomically.

use crate::model::record::RecordId;
use crate::model::schema::Model;
use crate::model::value::{AttributeMap, Row};
use crate::query::{AggregateFunction, Predicate, SortKey};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

pub mod binary;
pub mod memory;
pub mod sqlite;
mod tables;

pub use binary::BinaryStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store backend kind, ordered from least to most capable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Hash-map tables, no file on disk.
    InMemory,
    /// Single-file binary snapshot.
    Binary,
    /// SQLite engine-backed database file.
    Sqlite,
}

impl StoreKind {
    /// Whether predicate-scoped batch delete/update is available.
    pub fn supports_batch(&self) -> bool {
        matches!(self, StoreKind::Sqlite)
    }

    /// Whether server-side aggregate expressions are available.
    pub fn supports_server_aggregates(&self) -> bool {
        matches!(self, StoreKind::Sqlite)
    }

    /// File extension appended to the database file name.
    pub fn file_extension(&self) -> &'static str {
        match self {
            StoreKind::Sqlite => ".sqlite",
            StoreKind::Binary | StoreKind::InMemory => "",
        }
    }

    /// Stable name used in log events.
    pub fn name(&self) -> &'static str {
        match self {
            StoreKind::InMemory => "in_memory",
            StoreKind::Binary => "binary",
            StoreKind::Sqlite => "sqlite",
        }
    }
}

impl Display for StoreKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors surfaced by durable store backends.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    /// Snapshot file could not be encoded or decoded.
    Encoding(String),
    /// Operation not available on this store kind.
    Unsupported {
        kind: StoreKind,
        operation: &'static str,
    },
    /// Entity is not part of the configured model.
    UnknownEntity(String),
    /// Attribute is not declared by the entity.
    UnknownAttribute { entity: String, attribute: String },
    /// Persisted data cannot be converted back to model values.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Encoding(message) => write!(f, "snapshot encoding failed: {message}"),
            Self::Unsupported { kind, operation } => {
                write!(f, "store kind `{kind}` does not support {operation}")
            }
            Self::UnknownEntity(name) => write!(f, "unknown entity `{name}`"),
            Self::UnknownAttribute { entity, attribute } => {
                write!(f, "unknown attribute `{attribute}` on entity `{entity}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// One domain's pending changes handed to [`DurableStore::save`].
#[derive(Debug, Clone, Default)]
pub struct PendingSave {
    pub inserts: Vec<(RecordId, AttributeMap)>,
    pub updates: Vec<(RecordId, AttributeMap)>,
    pub deletes: Vec<RecordId>,
}

impl PendingSave {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }
}

/// Identifier-level changes produced by one save or batch mutation.
///
/// Consumed by the domain registry's merge step, then discarded.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub inserted: Vec<RecordId>,
    pub updated: Vec<RecordId>,
    pub deleted: Vec<RecordId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub(crate) fn from_pending(pending: &PendingSave) -> Self {
        Self {
            inserted: pending.inserts.iter().map(|(id, _)| id.clone()).collect(),
            updated: pending.updates.iter().map(|(id, _)| id.clone()).collect(),
            deleted: pending.deletes.clone(),
        }
    }
}

/// Narrow interface consumed from every durable store backend.
///
/// All calls happen through a confinement domain's serial executor; the
/// shared handle serializes cross-domain access with a mutex, so backends
/// need no internal locking.
pub trait DurableStore: Send {
    fn kind(&self) -> StoreKind;

    /// Resolves one committed record by identifier.
    fn fetch_one(&self, id: &RecordId) -> StoreResult<Option<AttributeMap>>;

    /// Fetches committed records matching a predicate, unsorted.
    ///
    /// Sorting happens after the caller overlays its pending view.
    fn fetch_many(
        &self,
        entity: &str,
        predicate: &Predicate,
    ) -> StoreResult<Vec<(RecordId, AttributeMap)>>;

    /// Fetches raw attribute-projection rows from committed state.
    fn fetch_rows(
        &self,
        entity: &str,
        properties: &[String],
        predicate: &Predicate,
        sort: &[SortKey],
        distinct: bool,
    ) -> StoreResult<Vec<Row>>;

    /// Counts committed records matching a predicate.
    fn count(&self, entity: &str, predicate: &Predicate) -> StoreResult<u64>;

    /// Deletes matching records in one predicate-scoped statement.
    ///
    /// Returns the affected identifiers. Only batch-capable kinds implement
    /// this; others return [`StoreError::Unsupported`].
    fn batch_delete(&mut self, entity: &str, predicate: &Predicate) -> StoreResult<Vec<RecordId>>;

    /// Updates matching records in one predicate-scoped statement.
    fn batch_update(
        &mut self,
        entity: &str,
        predicate: &Predicate,
        attributes: &AttributeMap,
    ) -> StoreResult<Vec<RecordId>>;

    /// Applies one domain's pending changes atomically.
    fn save(&mut self, pending: &PendingSave) -> StoreResult<ChangeSet>;

    /// Evaluates an aggregate server-side. Engine-backed kinds only.
    fn evaluate_aggregate(
        &self,
        func: AggregateFunction,
        entity: &str,
        property: &str,
        predicate: &Predicate,
    ) -> StoreResult<Option<Row>>;

    /// Irrecoverable teardown of the underlying files/state.
    fn destroy(&mut self) -> StoreResult<()>;
}

/// Store handle shared by all confinement domains of one session.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Box<dyn DurableStore>>>,
}

impl SharedStore {
    pub(crate) fn new(store: Box<dyn DurableStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Locks the store for one backend call.
    ///
    /// A poisoned lock still yields the store state; backends keep their
    /// invariants via transactions, not via the mutex.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn DurableStore>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Opens the backend described by kind, file name and directory.
pub(crate) fn open_store(
    kind: StoreKind,
    model: Arc<Model>,
    database_file_name: &str,
    store_dir: Option<&PathBuf>,
) -> StoreResult<Box<dyn DurableStore>> {
    match kind {
        StoreKind::InMemory => Ok(Box::new(MemoryStore::new(model))),
        StoreKind::Binary => {
            let dir = require_dir(kind, store_dir)?;
            let path = dir.join(database_file_name);
            Ok(Box::new(BinaryStore::open(model, path)?))
        }
        StoreKind::Sqlite => {
            let dir = require_dir(kind, store_dir)?;
            let file = format!("{database_file_name}{}", kind.file_extension());
            Ok(Box::new(SqliteStore::open(model, dir.join(file))?))
        }
    }
}

fn require_dir<'a>(kind: StoreKind, store_dir: Option<&'a PathBuf>) -> StoreResult<&'a PathBuf> {
    store_dir.ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("store kind `{kind}` requires a store directory"),
        ))
    })
}
