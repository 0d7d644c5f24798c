//! Single-file binary store kind.
//!
//! # Responsibility
//! - Persist the table set as one bincode snapshot file.
//! - Replace the file atomically on every save (write-then-rename).
//!
//! # Invariants
//! - A successful `save` leaves the file matching the in-memory tables.
//! - Batch delete/update and server-side aggregates report `Unsupported`.

use crate::model::record::RecordId;
use crate::model::schema::Model;
use crate::model::value::{AttributeMap, Row};
use crate::query::{AggregateFunction, Predicate, SortKey};
use crate::store::tables::{unsupported, TableData, TableSet};
use crate::store::{ChangeSet, DurableStore, PendingSave, StoreError, StoreKind, StoreResult};
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

pub struct BinaryStore {
    tables: TableSet,
    path: PathBuf,
}

impl BinaryStore {
    /// Opens (or creates) the snapshot file at `path`.
    ///
    /// # Side effects
    /// - Reads and decodes an existing snapshot when present.
    /// - Emits a `store_open` event.
    pub fn open(model: Arc<Model>, path: PathBuf) -> StoreResult<Self> {
        let tables = if path.exists() {
            let file = File::open(&path)?;
            let data: TableData = bincode::deserialize_from(BufReader::new(file))
                .map_err(|err| StoreError::Encoding(err.to_string()))?;
            TableSet::from_snapshot(&model, data)?
        } else {
            TableSet::empty(&model)
        };
        info!(
            "event=store_open module=store kind=binary status=ok path={}",
            path.display()
        );
        Ok(Self { tables, path })
    }

    fn persist(&self) -> StoreResult<()> {
        let parent = self.path.parent().ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "snapshot path has no parent directory",
            ))
        })?;
        std::fs::create_dir_all(parent)?;
        let staging = tempfile::NamedTempFile::new_in(parent)?;
        bincode::serialize_into(staging.as_file(), self.tables.snapshot())
            .map_err(|err| StoreError::Encoding(err.to_string()))?;
        staging
            .persist(&self.path)
            .map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }
}

impl DurableStore for BinaryStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Binary
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
        let change_set = self.tables.apply_save(pending)?;
        self.persist()?;
        Ok(change_set)
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
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
