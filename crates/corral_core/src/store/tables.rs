//! Map-backed table set shared by the in-memory and binary store kinds.
//!
//! # Responsibility
//! - Hold committed rows per entity and apply fetch/count/save against them.
//!
//! # Invariants
//! - Tables exist exactly for the entities the model declares.
//! - `apply_save` either applies every pending change or none (changes are
//!   staged against clones before swapping in).

use crate::model::record::RecordId;
use crate::model::schema::Model;
use crate::model::value::{AttributeMap, Row};
use crate::query::{compare_by_sort_keys, Predicate, SortKey};
use crate::store::{ChangeSet, PendingSave, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Committed rows for every entity, keyed by entity name then UUID key.
pub(crate) type TableData = HashMap<String, BTreeMap<Uuid, AttributeMap>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TableSet {
    tables: TableData,
}

impl TableSet {
    pub(crate) fn empty(model: &Model) -> Self {
        let tables = model
            .entities
            .iter()
            .map(|entity| (entity.name.clone(), BTreeMap::new()))
            .collect();
        Self { tables }
    }

    /// Restores a snapshot, verifying it covers exactly the model's entities.
    pub(crate) fn from_snapshot(model: &Model, tables: TableData) -> StoreResult<Self> {
        let mut restored = Self::empty(model);
        for (entity, rows) in tables {
            match restored.tables.get_mut(&entity) {
                Some(slot) => *slot = rows,
                None => {
                    return Err(StoreError::InvalidData(format!(
                        "snapshot contains undeclared entity `{entity}`"
                    )))
                }
            }
        }
        Ok(restored)
    }

    pub(crate) fn snapshot(&self) -> &TableData {
        &self.tables
    }

    pub(crate) fn clear(&mut self) {
        for rows in self.tables.values_mut() {
            rows.clear();
        }
    }

    fn table(&self, entity: &str) -> StoreResult<&BTreeMap<Uuid, AttributeMap>> {
        self.tables
            .get(entity)
            .ok_or_else(|| StoreError::UnknownEntity(entity.to_string()))
    }

    fn table_mut(&mut self, entity: &str) -> StoreResult<&mut BTreeMap<Uuid, AttributeMap>> {
        self.tables
            .get_mut(entity)
            .ok_or_else(|| StoreError::UnknownEntity(entity.to_string()))
    }

    pub(crate) fn fetch_one(&self, id: &RecordId) -> StoreResult<Option<AttributeMap>> {
        Ok(self.table(id.entity())?.get(&id.key()).cloned())
    }

    pub(crate) fn fetch_many(
        &self,
        entity: &str,
        predicate: &Predicate,
    ) -> StoreResult<Vec<(RecordId, AttributeMap)>> {
        let rows = self.table(entity)?;
        Ok(rows
            .iter()
            .filter(|(_, attrs)| predicate.matches(attrs))
            .map(|(key, attrs)| (RecordId::from_parts(entity, *key), attrs.clone()))
            .collect())
    }

    pub(crate) fn fetch_rows(
        &self,
        entity: &str,
        properties: &[String],
        predicate: &Predicate,
        sort: &[SortKey],
        distinct: bool,
    ) -> StoreResult<Vec<Row>> {
        let rows = self.table(entity)?;
        if properties.is_empty() {
            return Ok(Vec::new());
        }
        let mut matched: Vec<&AttributeMap> = rows
            .values()
            .filter(|attrs| predicate.matches(attrs))
            .collect();
        matched.sort_by(|a, b| compare_by_sort_keys(a, b, sort));

        let mut projected: Vec<Row> = Vec::with_capacity(matched.len());
        for attrs in matched {
            let mut row = Row::new();
            for property in properties {
                let value = attrs
                    .get(property)
                    .cloned()
                    .unwrap_or(crate::model::value::Value::Null);
                row.insert(property.clone(), value);
            }
            if distinct && projected.contains(&row) {
                continue;
            }
            projected.push(row);
        }
        Ok(projected)
    }

    pub(crate) fn count(&self, entity: &str, predicate: &Predicate) -> StoreResult<u64> {
        let rows = self.table(entity)?;
        Ok(rows.values().filter(|attrs| predicate.matches(attrs)).count() as u64)
    }

    /// Applies pending changes against staged table clones, swapping in only
    /// on full success.
    pub(crate) fn apply_save(&mut self, pending: &PendingSave) -> StoreResult<ChangeSet> {
        let mut staged = self.tables.clone();
        for (id, attrs) in pending.inserts.iter().chain(pending.updates.iter()) {
            let table = staged
                .get_mut(id.entity())
                .ok_or_else(|| StoreError::UnknownEntity(id.entity().to_string()))?;
            table.insert(id.key(), attrs.clone());
        }
        for id in &pending.deletes {
            let table = staged
                .get_mut(id.entity())
                .ok_or_else(|| StoreError::UnknownEntity(id.entity().to_string()))?;
            table.remove(&id.key());
        }
        self.tables = staged;
        Ok(ChangeSet::from_pending(pending))
    }
}

/// Builds the `Unsupported` error map-backed kinds report for batch ops.
pub(crate) fn unsupported(kind: crate::store::StoreKind, operation: &'static str) -> StoreError {
    StoreError::Unsupported { kind, operation }
}
