//! SQLite engine-backed store kind.
//!
//! # Responsibility
//! - Map the model onto one table per entity and keep all SQL inside this
//!   persistence boundary.
//! - Provide the batch-capable operations (predicate-scoped delete/update)
//!   and server-side aggregate evaluation.
//!
//! # Invariants
//! - Identifier quoting is safe because entity/attribute names passed model
//!   validation at open time.
//! - `save`, `batch_delete` and `batch_update` run inside one transaction.
//! - Aggregate results use 64-bit integer accumulation for sum/count/min/max
//!   and floating point for average.

use crate::model::record::RecordId;
use crate::model::schema::{AttributeKind, EntityDescriptor, Model, RECORD_ID_ATTRIBUTE};
use crate::model::value::{AttributeMap, Row, Value};
use crate::query::{AggregateFunction, CompareOp, Predicate, SortKey};
use crate::store::{ChangeSet, DurableStore, PendingSave, StoreError, StoreKind, StoreResult};
use log::{error, info};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub struct SqliteStore {
    model: Arc<Model>,
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Opens the database file and creates missing entity tables.
    ///
    /// # Side effects
    /// - Configures connection pragmas and applies the model schema.
    /// - Emits `store_open` events with duration and status.
    pub fn open(model: Arc<Model>, path: PathBuf) -> StoreResult<Self> {
        let started_at = Instant::now();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = match Connection::open(&path) {
            Ok(conn) => conn,
            Err(err) => {
                error!(
                    "event=store_open module=store kind=sqlite status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_schema(&mut conn, &model)?;
        info!(
            "event=store_open module=store kind=sqlite status=ok duration_ms={} path={}",
            started_at.elapsed().as_millis(),
            path.display()
        );
        Ok(Self { model, conn, path })
    }

    fn entity(&self, name: &str) -> StoreResult<&EntityDescriptor> {
        self.model
            .entity(name)
            .ok_or_else(|| StoreError::UnknownEntity(name.to_string()))
    }

    fn require_attribute(&self, entity: &EntityDescriptor, name: &str) -> StoreResult<()> {
        if entity.attribute(name).is_none() {
            return Err(StoreError::UnknownAttribute {
                entity: entity.name.clone(),
                attribute: name.to_string(),
            });
        }
        Ok(())
    }

    fn select_ids(&self, entity: &str, predicate: &Predicate) -> StoreResult<Vec<RecordId>> {
        let mut params = Vec::new();
        let sql = format!(
            "SELECT {RECORD_ID_ATTRIBUTE} FROM {} WHERE {}",
            quote(entity),
            predicate_sql(predicate, &mut params)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter().map(bind_value)))?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            ids.push(RecordId::from_parts(entity, parse_key(&key)?));
        }
        Ok(ids)
    }
}

impl DurableStore for SqliteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Sqlite
    }

    fn fetch_one(&self, id: &RecordId) -> StoreResult<Option<AttributeMap>> {
        let entity = self.entity(id.entity())?;
        let sql = format!(
            "SELECT {RECORD_ID_ATTRIBUTE}{} FROM {} WHERE {RECORD_ID_ATTRIBUTE} = ?1",
            column_list(entity),
            quote(&entity.name)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([id.key().to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_attributes(entity, row)?)),
            None => Ok(None),
        }
    }

    fn fetch_many(
        &self,
        entity: &str,
        predicate: &Predicate,
    ) -> StoreResult<Vec<(RecordId, AttributeMap)>> {
        let entity = self.entity(entity)?;
        let mut params = Vec::new();
        let sql = format!(
            "SELECT {RECORD_ID_ATTRIBUTE}{} FROM {} WHERE {}",
            column_list(entity),
            quote(&entity.name),
            predicate_sql(predicate, &mut params)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter().map(bind_value)))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let id = RecordId::from_parts(&entity.name, parse_key(&key)?);
            records.push((id, read_attributes_offset(entity, row, 1)?));
        }
        Ok(records)
    }

    fn fetch_rows(
        &self,
        entity: &str,
        properties: &[String],
        predicate: &Predicate,
        sort: &[SortKey],
        distinct: bool,
    ) -> StoreResult<Vec<Row>> {
        let entity = self.entity(entity)?;
        if properties.is_empty() {
            return Ok(Vec::new());
        }
        for property in properties {
            self.require_attribute(entity, property)?;
        }
        for key in sort {
            self.require_attribute(entity, &key.attribute)?;
        }
        let mut params = Vec::new();
        let columns = properties
            .iter()
            .map(|name| quote(name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "SELECT {}{columns} FROM {} WHERE {}",
            if distinct { "DISTINCT " } else { "" },
            quote(&entity.name),
            predicate_sql(predicate, &mut params)
        );
        if !sort.is_empty() {
            let order = sort
                .iter()
                .map(|key| {
                    format!(
                        "{} {}",
                        quote(&key.attribute),
                        if key.ascending { "ASC" } else { "DESC" }
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {order}"));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter().map(bind_value)))?;
        let mut projected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (index, property) in properties.iter().enumerate() {
                let kind = entity.attribute(property).map(|attr| attr.kind);
                out.insert(property.clone(), read_value(row.get_ref(index)?, kind)?);
            }
            projected.push(out);
        }
        Ok(projected)
    }

    fn count(&self, entity: &str, predicate: &Predicate) -> StoreResult<u64> {
        let entity = self.entity(entity)?;
        let mut params = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote(&entity.name),
            predicate_sql(predicate, &mut params)
        );
        let count: i64 = self.conn.query_row(
            &sql,
            params_from_iter(params.iter().map(bind_value)),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn batch_delete(&mut self, entity: &str, predicate: &Predicate) -> StoreResult<Vec<RecordId>> {
        let entity_name = self.entity(entity)?.name.clone();
        let ids = self.select_ids(&entity_name, predicate)?;
        let mut params = Vec::new();
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote(&entity_name),
            predicate_sql(predicate, &mut params)
        );
        let tx = self.conn.transaction()?;
        tx.execute(&sql, params_from_iter(params.iter().map(bind_value)))?;
        tx.commit()?;
        Ok(ids)
    }

    fn batch_update(
        &mut self,
        entity: &str,
        predicate: &Predicate,
        attributes: &AttributeMap,
    ) -> StoreResult<Vec<RecordId>> {
        let entity_desc = self.entity(entity)?.clone();
        for name in attributes.keys() {
            self.require_attribute(&entity_desc, name)?;
        }
        let ids = self.select_ids(&entity_desc.name, predicate)?;

        let mut params: Vec<Value> = Vec::new();
        let assignments = attributes
            .iter()
            .map(|(name, value)| {
                params.push(value.clone());
                format!("{} = ?{}", quote(name), params.len())
            })
            .collect::<Vec<_>>()
            .join(", ");
        let where_clause = predicate_sql_offset(predicate, &mut params);
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {where_clause}",
            quote(&entity_desc.name)
        );
        let tx = self.conn.transaction()?;
        tx.execute(&sql, params_from_iter(params.iter().map(bind_value)))?;
        tx.commit()?;
        Ok(ids)
    }

    fn save(&mut self, pending: &PendingSave) -> StoreResult<ChangeSet> {
        // Validate outside the transaction so a bad pending set changes nothing.
        for (id, attrs) in pending.inserts.iter().chain(pending.updates.iter()) {
            let entity = self.entity(id.entity())?.clone();
            for name in attrs.keys() {
                self.require_attribute(&entity, name)?;
            }
        }
        for id in &pending.deletes {
            self.entity(id.entity())?;
        }

        let model = self.model.clone();
        let tx = self.conn.transaction()?;
        for (id, attrs) in pending.inserts.iter().chain(pending.updates.iter()) {
            let entity = model
                .entity(id.entity())
                .ok_or_else(|| StoreError::UnknownEntity(id.entity().to_string()))?;
            let mut placeholders = vec!["?1".to_string()];
            let mut params: Vec<rusqlite::types::Value> =
                vec![rusqlite::types::Value::Text(id.key().to_string())];
            for attr in &entity.attributes {
                let value = attrs.get(&attr.name).unwrap_or(&Value::Null);
                params.push(bind_value(value));
                placeholders.push(format!("?{}", params.len()));
            }
            let sql = format!(
                "INSERT OR REPLACE INTO {} ({RECORD_ID_ATTRIBUTE}{}) VALUES ({})",
                quote(&entity.name),
                column_list(entity),
                placeholders.join(", ")
            );
            tx.execute(&sql, params_from_iter(params))?;
        }
        for id in &pending.deletes {
            let sql = format!(
                "DELETE FROM {} WHERE {RECORD_ID_ATTRIBUTE} = ?1",
                quote(id.entity())
            );
            tx.execute(&sql, [id.key().to_string()])?;
        }
        tx.commit()?;
        Ok(ChangeSet::from_pending(pending))
    }

    fn evaluate_aggregate(
        &self,
        func: AggregateFunction,
        entity: &str,
        property: &str,
        predicate: &Predicate,
    ) -> StoreResult<Option<Row>> {
        let entity = self.entity(entity)?;
        self.require_attribute(entity, property)?;
        let mut params = Vec::new();
        let expression = aggregate_expression(func, property);
        let sql = format!(
            "SELECT {expression} FROM {} WHERE {}",
            quote(&entity.name),
            predicate_sql(predicate, &mut params)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter().map(bind_value)))?;
        match rows.next()? {
            Some(row) => {
                let value = match row.get_ref(0)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(value) => Value::Integer(value),
                    ValueRef::Real(value) => Value::Real(value),
                    other => {
                        return Err(StoreError::InvalidData(format!(
                            "aggregate returned non-numeric column: {other:?}"
                        )))
                    }
                };
                let mut out = Row::new();
                out.insert(property.to_string(), value);
                Ok(Some(out))
            }
            None => Ok(None),
        }
    }

    fn destroy(&mut self) -> StoreResult<()> {
        remove_if_present(&self.path)?;
        // SQLite sidecar files from WAL mode.
        remove_if_present(&sidecar(&self.path, "-wal"))?;
        remove_if_present(&sidecar(&self.path, "-shm"))?;
        Ok(())
    }
}

fn apply_schema(conn: &mut Connection, model: &Model) -> StoreResult<()> {
    let tx = conn.transaction()?;
    for entity in &model.entities {
        let columns = entity
            .attributes
            .iter()
            .map(|attr| format!("{} {}", quote(&attr.name), column_type(attr.kind)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = if columns.is_empty() {
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({RECORD_ID_ATTRIBUTE} TEXT PRIMARY KEY NOT NULL)",
                quote(&entity.name)
            )
        } else {
            format!(
                "CREATE TABLE IF NOT EXISTS {} ({RECORD_ID_ATTRIBUTE} TEXT PRIMARY KEY NOT NULL, {columns})",
                quote(&entity.name)
            )
        };
        tx.execute_batch(&sql)?;
    }
    tx.commit()?;
    Ok(())
}

fn column_type(kind: AttributeKind) -> &'static str {
    match kind {
        AttributeKind::Integer | AttributeKind::Boolean => "INTEGER",
        AttributeKind::Real => "REAL",
        AttributeKind::Text => "TEXT",
    }
}

/// Renders `, "a", "b"` so select/insert lists stay valid for entities
/// without attributes.
fn column_list(entity: &EntityDescriptor) -> String {
    entity
        .attributes
        .iter()
        .map(|attr| format!(", {}", quote(&attr.name)))
        .collect()
}

/// Quotes an identifier that already passed model validation.
fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

fn aggregate_expression(func: AggregateFunction, property: &str) -> String {
    let column = quote(property);
    match func {
        // SUM keeps 64-bit integer accumulation; TOTAL would round through
        // floating point. COALESCE preserves the zero result for no rows.
        AggregateFunction::Sum => format!("CAST(COALESCE(SUM({column}), 0) AS INTEGER)"),
        AggregateFunction::Count => format!("COUNT({column})"),
        AggregateFunction::Min => format!("CAST(MIN({column}) AS INTEGER)"),
        AggregateFunction::Max => format!("CAST(MAX({column}) AS INTEGER)"),
        AggregateFunction::Average => format!("AVG({column})"),
    }
}

/// Renders a predicate as a WHERE clause, appending bind values to `params`.
fn predicate_sql(predicate: &Predicate, params: &mut Vec<Value>) -> String {
    predicate_sql_offset(predicate, params)
}

fn predicate_sql_offset(predicate: &Predicate, params: &mut Vec<Value>) -> String {
    match predicate {
        Predicate::All => "1 = 1".to_string(),
        Predicate::Compare {
            attribute,
            op,
            value,
        } => {
            if value.is_null() {
                return match op {
                    CompareOp::Eq => format!("{} IS NULL", quote(attribute)),
                    CompareOp::Ne => format!("{} IS NOT NULL", quote(attribute)),
                    // Ordered comparison against NULL matches nothing.
                    _ => "0 = 1".to_string(),
                };
            }
            params.push(value.clone());
            format!("{} {} ?{}", quote(attribute), sql_op(*op), params.len())
        }
        Predicate::And(parts) => join_parts(parts, " AND ", "1 = 1", params),
        Predicate::Or(parts) => join_parts(parts, " OR ", "0 = 1", params),
        Predicate::Not(inner) => format!("NOT ({})", predicate_sql_offset(inner, params)),
    }
}

fn join_parts(parts: &[Predicate], sep: &str, empty: &str, params: &mut Vec<Value>) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let rendered = parts
        .iter()
        .map(|part| format!("({})", predicate_sql_offset(part, params)))
        .collect::<Vec<_>>()
        .join(sep);
    rendered
}

fn sql_op(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::Ne => "<>",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
    }
}

fn bind_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Boolean(value) => rusqlite::types::Value::Integer(i64::from(*value)),
        Value::Integer(value) => rusqlite::types::Value::Integer(*value),
        Value::Real(value) => rusqlite::types::Value::Real(*value),
        Value::Text(value) => rusqlite::types::Value::Text(value.clone()),
    }
}

fn read_value(raw: ValueRef<'_>, kind: Option<AttributeKind>) -> StoreResult<Value> {
    let value = match (raw, kind) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(value), Some(AttributeKind::Boolean)) => match value {
            0 => Value::Boolean(false),
            1 => Value::Boolean(true),
            other => {
                return Err(StoreError::InvalidData(format!(
                    "invalid boolean column value `{other}`"
                )))
            }
        },
        (ValueRef::Integer(value), _) => Value::Integer(value),
        (ValueRef::Real(value), _) => Value::Real(value),
        (ValueRef::Text(bytes), _) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|err| StoreError::InvalidData(format!("non-utf8 text column: {err}")))?
                .to_string(),
        ),
        (ValueRef::Blob(_), _) => {
            return Err(StoreError::InvalidData(
                "unexpected blob column in entity table".to_string(),
            ))
        }
    };
    Ok(value)
}

fn read_attributes(entity: &EntityDescriptor, row: &rusqlite::Row<'_>) -> StoreResult<AttributeMap> {
    // Column 0 is always the record identifier.
    read_attributes_offset(entity, row, 1)
}

fn read_attributes_offset(
    entity: &EntityDescriptor,
    row: &rusqlite::Row<'_>,
    offset: usize,
) -> StoreResult<AttributeMap> {
    let mut attributes = AttributeMap::new();
    for (index, attr) in entity.attributes.iter().enumerate() {
        let value = read_value(row.get_ref(offset + index)?, Some(attr.kind))?;
        if !value.is_null() {
            attributes.insert(attr.name.clone(), value);
        }
    }
    Ok(attributes)
}

fn parse_key(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| StoreError::InvalidData(format!("invalid record key `{raw}`")))
}

fn sidecar(path: &PathBuf, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_if_present(path: &PathBuf) -> StoreResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
