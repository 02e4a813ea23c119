//! SQLite backend implementation using rusqlite.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, OpenFlags, ToSql};
use tracing::{debug, info};

use crate::backend::{SessionBackend, SqlRow};
use crate::error::{BackendError, Result};
use crate::value::SqlValue;

/// Session backend backed by a SQLite database.
///
/// The connection sits behind a `Mutex<Option<...>>` so that `close()` can
/// drop it; queries issued after close fail with
/// [`BackendError::ConnectionClosed`] instead of panicking.
pub struct SqliteBackend {
    conn: Mutex<Option<Connection>>,
}

impl SqliteBackend {
    /// Open or create a SQLite database at the given path.
    ///
    /// Creates the parent directory if it doesn't exist and enables WAL
    /// mode for better concurrent read performance.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        info!("SQLite session backend opened at {:?}", path);
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Create an in-memory backend (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        debug!("In-memory SQLite session backend created");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Whether the connection is still open.
    pub fn is_open(&self) -> bool {
        self.conn.lock().unwrap().is_some()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock().unwrap();
        let conn = guard.as_ref().ok_or(BackendError::ConnectionClosed)?;
        f(conn)
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("open", &self.is_open())
            .finish()
    }
}

impl SessionBackend for SqliteBackend {
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let column_count = stmt.column_count();

            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut cells = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    cells.push(value_from_ref(row.get_ref(i)?));
                }
                out.push(cells);
            }
            Ok(out)
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().unwrap();
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| BackendError::Database(e))?;
            debug!("SQLite session backend closed");
        }
        Ok(())
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(r) => SqlValue::Real(r),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}
