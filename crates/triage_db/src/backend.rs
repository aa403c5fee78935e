//! Synchronous SQLite backend.
//!
//! One connection per case, shared behind a mutex so the orchestrator and the
//! image sub-task can both reach it from their own threads. A transaction holds
//! the lock for its whole lifetime, so concurrent readers observe either all of
//! its rows or none of them.

use crate::error::{BackendError, Result};
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug_span, warn};

/// Value type for query parameters and results.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Integer(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        DbValue::Integer(v as i64)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Real(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Integer(v as i64)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        DbValue::Blob(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => DbValue::Null,
        }
    }
}

impl From<ValueRef<'_>> for DbValue {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => DbValue::Null,
            ValueRef::Integer(i) => DbValue::Integer(i),
            ValueRef::Real(r) => DbValue::Real(r),
            ValueRef::Text(t) => DbValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => DbValue::Blob(b.to_vec()),
        }
    }
}

impl rusqlite::ToSql for DbValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DbValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            DbValue::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            DbValue::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            DbValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            DbValue::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

/// A materialised result row.
#[derive(Debug, Clone)]
pub struct DbRow {
    columns: Arc<[String]>,
    values: Vec<DbValue>,
}

impl DbRow {
    fn new(columns: Arc<[String]>, values: Vec<DbValue>) -> Self {
        Self { columns, values }
    }

    /// Typed value at a column index.
    pub fn get<T: FromDbValue>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or_else(|| {
            BackendError::TypeConversion(format!("Column index {} out of range", index))
        })?;
        T::from_db_value(value)
    }

    /// Typed value by column name.
    pub fn get_by_name<T: FromDbValue>(&self, name: &str) -> Result<T> {
        let index = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| BackendError::TypeConversion(format!("No column named '{}'", name)))?;
        self.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Conversion from a raw [`DbValue`].
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self>;
}

impl FromDbValue for i64 {
    fn from_db_value(value: &DbValue) -> Result<Self> {
        match value {
            DbValue::Integer(v) => Ok(*v),
            DbValue::Null => Err(BackendError::TypeConversion(
                "i64 field is NULL - use Option<i64> for nullable columns".to_string(),
            )),
            other => Err(BackendError::TypeConversion(format!(
                "Expected integer, got {:?}",
                other
            ))),
        }
    }
}

impl FromDbValue for f64 {
    fn from_db_value(value: &DbValue) -> Result<Self> {
        match value {
            DbValue::Real(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v as f64),
            other => Err(BackendError::TypeConversion(format!(
                "Expected real, got {:?}",
                other
            ))),
        }
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: &DbValue) -> Result<Self> {
        match value {
            DbValue::Integer(v) => Ok(*v != 0),
            other => Err(BackendError::TypeConversion(format!(
                "Expected boolean integer, got {:?}",
                other
            ))),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self> {
        match value {
            DbValue::Text(v) => Ok(v.clone()),
            DbValue::Null => Err(BackendError::TypeConversion(
                "String field is NULL - use Option<String> for nullable columns".to_string(),
            )),
            other => Err(BackendError::TypeConversion(format!(
                "Expected text, got {:?}",
                other
            ))),
        }
    }
}

impl FromDbValue for Vec<u8> {
    fn from_db_value(value: &DbValue) -> Result<Self> {
        match value {
            DbValue::Blob(v) => Ok(v.clone()),
            other => Err(BackendError::TypeConversion(format!(
                "Expected blob, got {:?}",
                other
            ))),
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self> {
        match value {
            DbValue::Null => Ok(None),
            other => T::from_db_value(other).map(Some),
        }
    }
}

/// Shared handle to one SQLite connection.
#[derive(Clone)]
pub struct DbConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnection")
            .field("backend", &"SQLite")
            .field("path", &self.path)
            .finish()
    }
}

impl DbConnection {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        Self::configure(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::configure(conn, None)
    }

    fn configure(conn: rusqlite::Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // A panic inside `transaction` poisons the mutex after rusqlite has already
    // rolled back, so the connection itself is still consistent.
    fn lock(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        Ok(self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("Recovering case database connection after a panic");
            poisoned.into_inner()
        }))
    }

    pub fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64> {
        let conn = self.lock()?;
        execute_on(&conn, sql, params)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.lock()?;
        let span = debug_span!("db.exec_batch", duration_ms = tracing::field::Empty);
        let _guard = span.enter();
        let start = Instant::now();
        conn.execute_batch(sql)?;
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(())
    }

    pub fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>> {
        let conn = self.lock()?;
        query_on(&conn, sql, params)
    }

    pub fn query_optional(&self, sql: &str, params: &[DbValue]) -> Result<Option<DbRow>> {
        Ok(self.query_all(sql, params)?.into_iter().next())
    }

    pub fn query_one(&self, sql: &str, params: &[DbValue]) -> Result<DbRow> {
        self.query_optional(sql, params)?
            .ok_or_else(|| BackendError::not_found("Query returned no rows"))
    }

    pub fn query_scalar<T: FromDbValue>(&self, sql: &str, params: &[DbValue]) -> Result<T> {
        self.query_one(sql, params)?.get(0)
    }

    /// Run `op` inside one transaction.
    ///
    /// Commits when `op` returns `Ok`, rolls back when it returns `Err`. If `op`
    /// panics, dropping the underlying `rusqlite::Transaction` rolls back.
    pub fn transaction<T, E, F>(&self, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut DbTransaction<'_>) -> std::result::Result<T, E>,
        E: From<BackendError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(BackendError::from)?;
        let mut db_tx = DbTransaction { tx };

        match op(&mut db_tx) {
            Ok(value) => {
                db_tx
                    .tx
                    .commit()
                    .map_err(|e| BackendError::Transaction(format!("Commit failed: {}", e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = db_tx.tx.rollback() {
                    warn!(error = %rollback_err, "Failed to roll back transaction");
                }
                Err(err)
            }
        }
    }
}

/// Statement access inside [`DbConnection::transaction`].
pub struct DbTransaction<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl<'a> DbTransaction<'a> {
    pub fn execute(&mut self, sql: &str, params: &[DbValue]) -> Result<u64> {
        execute_on(&self.tx, sql, params)
    }

    pub fn query_all(&mut self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>> {
        query_on(&self.tx, sql, params)
    }

    pub fn query_optional(&mut self, sql: &str, params: &[DbValue]) -> Result<Option<DbRow>> {
        Ok(self.query_all(sql, params)?.into_iter().next())
    }

    pub fn query_scalar<T: FromDbValue>(&mut self, sql: &str, params: &[DbValue]) -> Result<T> {
        self.query_optional(sql, params)?
            .ok_or_else(|| BackendError::not_found("Query returned no rows"))?
            .get(0)
    }

    /// Row id of the last successful INSERT in this transaction.
    pub fn last_insert_rowid(&self) -> i64 {
        self.tx.last_insert_rowid()
    }
}

fn execute_on(conn: &rusqlite::Connection, sql: &str, params: &[DbValue]) -> Result<u64> {
    let span = debug_span!(
        "db.exec",
        op = sql_op_name(sql),
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();

    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.execute(rusqlite::params_from_iter(params.iter()))?;
    span.record("duration_ms", start.elapsed().as_millis() as u64);
    Ok(rows as u64)
}

fn query_on(conn: &rusqlite::Connection, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>> {
    let span = debug_span!(
        "db.query",
        op = sql_op_name(sql),
        duration_ms = tracing::field::Empty
    );
    let _guard = span.enter();
    let start = Instant::now();

    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(|c| c.to_string())
        .collect();
    let width = columns.len();

    let mut out = Vec::new();
    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for index in 0..width {
            values.push(DbValue::from(row.get_ref(index)?));
        }
        out.push(DbRow::new(Arc::clone(&columns), values));
    }

    span.record("duration_ms", start.elapsed().as_millis() as u64);
    Ok(out)
}

fn sql_op_name(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("unknown")
}
