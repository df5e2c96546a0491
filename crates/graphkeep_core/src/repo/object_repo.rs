//! Object row repository contract and SQLite implementation.
//!
//! # Invariants
//! - `data` always holds a JSON object.
//! - Batch deletes ignore the criteria limit and remove every match.

use crate::context::ContextId;
use crate::db::DbError;
use crate::model::entity::ObjectId;
use crate::query::FetchCriteria;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::{Map, Value as JsonValue};
use std::error::Error;
use std::fmt::{Display, Formatter};

const OBJECT_SELECT_SQL: &str = "SELECT
    object_id,
    entity,
    unique_id,
    data
FROM objects";

pub type StoreResult<T> = Result<T, StoreError>;

/// Underlying store failure wrapped by every operation error.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Json(serde_json::Error),
    /// Entity name is not part of the store's object model.
    UnknownEntity(String),
    /// Object identity no longer resolves to a stored row.
    MissingObject(ObjectId),
    /// A record was handed to a context that does not own it.
    ForeignContext {
        record: ContextId,
        context: ContextId,
    },
    /// Record encoding did not produce a JSON object.
    NotAnObject(String),
    InvalidData(String),
    /// The blocking store task was cancelled before finishing.
    Interrupted(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "record encoding failed: {err}"),
            Self::UnknownEntity(name) => write!(f, "entity `{name}` is not in the object model"),
            Self::MissingObject(id) => write!(f, "object not found: {id}"),
            Self::ForeignContext { record, context } => write!(
                f,
                "record belongs to context {record}, not context {context}"
            ),
            Self::NotAnObject(entity) => {
                write!(f, "entity `{entity}` must encode to a JSON object")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted object data: {message}"),
            Self::Interrupted(message) => write!(f, "store task interrupted: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::UnknownEntity(_)
            | Self::MissingObject(_)
            | Self::ForeignContext { .. }
            | Self::NotAnObject(_)
            | Self::InvalidData(_)
            | Self::Interrupted(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// One persisted object as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRow {
    pub object_id: ObjectId,
    pub entity: String,
    pub unique_id: Option<String>,
    pub data: Map<String, JsonValue>,
}

/// Repository interface over stored object rows.
pub trait ObjectRepository {
    fn insert_object(&self, row: &ObjectRow) -> StoreResult<()>;
    /// Replaces `unique_id` and `data`; fails with `MissingObject` when absent.
    fn update_object(&self, row: &ObjectRow) -> StoreResult<()>;
    fn get_object(&self, id: ObjectId) -> StoreResult<Option<ObjectRow>>;
    fn select_objects(&self, criteria: &FetchCriteria) -> StoreResult<Vec<ObjectRow>>;
    /// Counts matches, capped by the criteria limit when one is set.
    fn count_objects(&self, criteria: &FetchCriteria) -> StoreResult<usize>;
    /// Returns whether a row was removed.
    fn delete_object(&self, id: ObjectId) -> StoreResult<bool>;
    /// Deletes every match without loading it and returns the deleted ids.
    fn batch_delete(&self, criteria: &FetchCriteria) -> StoreResult<Vec<ObjectId>>;
}

/// SQLite-backed object repository.
pub struct SqliteObjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteObjectRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ObjectRepository for SqliteObjectRepository<'_> {
    fn insert_object(&self, row: &ObjectRow) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO objects (
                object_id,
                entity,
                unique_id,
                data
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                row.object_id.to_string(),
                row.entity.as_str(),
                row.unique_id.as_deref(),
                serde_json::to_string(&row.data)?,
            ],
        )?;
        Ok(())
    }

    fn update_object(&self, row: &ObjectRow) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE objects
             SET
                unique_id = ?1,
                data = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE object_id = ?3 AND entity = ?4;",
            params![
                row.unique_id.as_deref(),
                serde_json::to_string(&row.data)?,
                row.object_id.to_string(),
                row.entity.as_str(),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::MissingObject(row.object_id));
        }
        Ok(())
    }

    fn get_object(&self, id: ObjectId) -> StoreResult<Option<ObjectRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{OBJECT_SELECT_SQL} WHERE object_id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_object_row(row)?));
        }
        Ok(None)
    }

    fn select_objects(&self, criteria: &FetchCriteria) -> StoreResult<Vec<ObjectRow>> {
        let (where_sql, mut bind_values) = where_clause(criteria);
        let mut sql = format!("{OBJECT_SELECT_SQL} WHERE {where_sql}");

        if !criteria.sort().is_empty() {
            let terms: Vec<String> = criteria
                .sort()
                .iter()
                .map(|term| term.to_order_term())
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        if let Some(limit) = criteria.limit() {
            sql.push_str(" LIMIT ?");
            bind_values.push(limit_value(limit));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut objects = Vec::new();
        while let Some(row) = rows.next()? {
            objects.push(parse_object_row(row)?);
        }
        Ok(objects)
    }

    fn count_objects(&self, criteria: &FetchCriteria) -> StoreResult<usize> {
        let (where_sql, mut bind_values) = where_clause(criteria);
        let sql = match criteria.limit() {
            Some(limit) => {
                bind_values.push(limit_value(limit));
                format!("SELECT COUNT(*) FROM (SELECT 1 FROM objects WHERE {where_sql} LIMIT ?)")
            }
            None => format!("SELECT COUNT(*) FROM objects WHERE {where_sql}"),
        };

        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(bind_values), |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| StoreError::InvalidData(format!("negative row count `{count}`")))
    }

    fn delete_object(&self, id: ObjectId) -> StoreResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM objects WHERE object_id = ?1;", [id.to_string()])?;
        Ok(changed > 0)
    }

    fn batch_delete(&self, criteria: &FetchCriteria) -> StoreResult<Vec<ObjectId>> {
        let (where_sql, bind_values) = where_clause(criteria);
        let mut stmt = self.conn.prepare(&format!(
            "DELETE FROM objects WHERE {where_sql} RETURNING object_id;"
        ))?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut deleted = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get(0)?;
            deleted.push(parse_object_id(&id_text)?);
        }
        Ok(deleted)
    }
}

fn where_clause(criteria: &FetchCriteria) -> (String, Vec<Value>) {
    let mut sql = String::from("entity = ?");
    let mut bind_values = vec![Value::Text(criteria.entity().to_string())];
    if let Some(predicate) = criteria.predicate() {
        sql.push_str(&format!(" AND ({})", predicate.sql()));
        bind_values.extend(predicate.params().iter().cloned());
    }
    (sql, bind_values)
}

fn limit_value(limit: usize) -> Value {
    Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX))
}

fn parse_object_id(value: &str) -> StoreResult<ObjectId> {
    ObjectId::parse(value).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid object id `{value}` in objects.object_id"))
    })
}

fn parse_object_row(row: &Row<'_>) -> StoreResult<ObjectRow> {
    let id_text: String = row.get("object_id")?;
    let object_id = parse_object_id(&id_text)?;

    let data_text: String = row.get("data")?;
    let data = match serde_json::from_str::<JsonValue>(&data_text)? {
        JsonValue::Object(map) => map,
        other => {
            return Err(StoreError::InvalidData(format!(
                "objects.data for {object_id} is not a JSON object: {other}"
            )));
        }
    };

    Ok(ObjectRow {
        object_id,
        entity: row.get("entity")?,
        unique_id: row.get("unique_id")?,
        data,
    })
}
