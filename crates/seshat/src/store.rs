//! The session store: lifecycle, readiness, and CRUD operations.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use seshat_backend::{BackendError, SessionBackend, SqlRow, SqlValue, SqliteBackend};
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

use crate::config::{Schema, StoreConfig, StoreOptions};
use crate::error::{Error, Result};
use crate::expiry::session_expiry;
use crate::sweeper::Sweeper;

/// Lifecycle state of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Constructed, init not yet started.
    Uninitialized,
    /// Init task running (table setup, sweeper start).
    Initializing,
    /// Ready for CRUD operations.
    Initialized,
    /// Close in progress.
    Closing,
    /// Connection released. No transition out of this state.
    Closed,
}

/// Readiness signal published by the init task.
#[derive(Debug, Clone)]
enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

/// Session store over a relational backend.
///
/// Construction spawns an async init pipeline (optional table creation,
/// then sweeper start); await [`on_ready`](SessionStore::on_ready) before
/// relying on CRUD calls. All operations are single parameterized SQL
/// statements funneled through the backend's one query primitive. The
/// async signatures fit middleware callers; the bundled SQLite backend
/// executes each statement synchronously on the calling task.
///
/// Must be constructed within a Tokio runtime.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    config: StoreConfig,
    idents: SqlIdents,
    state: Arc<Mutex<StoreState>>,
    ready_rx: watch::Receiver<Readiness>,
    sweeper: Arc<Sweeper>,
}

impl SessionStore {
    /// Create a store over an externally managed backend.
    ///
    /// The store will never close an injected backend, regardless of the
    /// `end_connection_on_close` option.
    pub fn with_backend(options: StoreOptions, backend: Arc<dyn SessionBackend>) -> Result<Self> {
        Self::new(options, backend, false)
    }

    /// Create a store with its own SQLite backend at the given path.
    ///
    /// The store owns the connection and releases it on `close()`.
    pub fn open(options: StoreOptions, path: impl AsRef<Path>) -> Result<Self> {
        let backend = Arc::new(SqliteBackend::open(path)?);
        Self::new(options, backend, true)
    }

    /// Create a store with its own in-memory SQLite backend (useful for
    /// testing).
    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let backend = Arc::new(SqliteBackend::open_in_memory()?);
        Self::new(options, backend, true)
    }

    fn new(
        options: StoreOptions,
        backend: Arc<dyn SessionBackend>,
        owns_backend: bool,
    ) -> Result<Self> {
        // Configuration errors surface synchronously, before any query.
        let mut config = StoreConfig::from_options(options)?;
        // The store only ever closes a connection it created itself.
        config.end_connection_on_close = owns_backend;

        let idents = SqlIdents::from_schema(&config.schema);
        let (ready_tx, ready_rx) = watch::channel(Readiness::Pending);

        let store = Self {
            backend,
            config,
            idents,
            state: Arc::new(Mutex::new(StoreState::Uninitialized)),
            ready_rx,
            sweeper: Arc::new(Sweeper::new()),
        };
        store.spawn_init(ready_tx);
        Ok(store)
    }

    /// Kick off the init pipeline: table setup, state transition, sweeper
    /// start, readiness publication. A setup failure is published through
    /// the readiness channel and the store never reaches `Initialized`.
    fn spawn_init(&self, ready_tx: watch::Sender<Readiness>) {
        *self.state.lock().unwrap() = StoreState::Initializing;

        let backend = Arc::clone(&self.backend);
        let config = self.config.clone();
        let idents = self.idents.clone();
        let state = Arc::clone(&self.state);
        let sweeper = Arc::clone(&self.sweeper);

        tokio::spawn(async move {
            let setup = if config.create_database_table {
                create_sessions_table(&*backend, &idents, &config.charset)
            } else {
                Ok(())
            };

            match setup {
                Ok(()) => {
                    *state.lock().unwrap() = StoreState::Initialized;
                    if config.clear_expired {
                        sweeper.start(
                            Arc::clone(&backend),
                            idents.delete_expired_sql(),
                            Duration::from_millis(config.check_expiration_interval),
                        );
                    }
                    debug!(table = %config.schema.table_name, "Session store initialized");
                    let _ = ready_tx.send(Readiness::Ready);
                }
                Err(e) => {
                    error!(error = %e, "Session table setup failed");
                    let _ = ready_tx.send(Readiness::Failed(e.to_string()));
                }
            }
        });
    }

    /// Wait until the store is initialized.
    ///
    /// Resolves immediately if init already completed; yields the captured
    /// init error if table setup failed.
    pub async fn on_ready(&self) -> Result<()> {
        let mut rx = self.ready_rx.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            match current {
                Readiness::Ready => return Ok(()),
                Readiness::Failed(msg) => return Err(Error::Init(msg)),
                Readiness::Pending => {
                    if rx.changed().await.is_err() {
                        return Err(Error::Init("init task dropped".to_string()));
                    }
                }
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        *self.state.lock().unwrap()
    }

    /// The resolved configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether the expiration sweeper is currently scheduled.
    pub fn sweeper_running(&self) -> bool {
        self.sweeper.is_running()
    }

    /// Re-arm the expiration sweeper with a new interval: cancels any
    /// existing timer, sweeps immediately, then repeats at `interval`.
    pub fn set_expiration_interval(&self, interval: Duration) {
        self.sweeper.start(
            Arc::clone(&self.backend),
            self.idents.delete_expired_sql(),
            interval,
        );
    }

    /// Stop the store: cancels the sweeper unconditionally, then releases
    /// the backend connection if (and only if) the store owns it and is
    /// initialized. Does not wait for in-flight operations.
    pub async fn close(&self) -> Result<()> {
        self.sweeper.stop();

        {
            let mut state = self.state.lock().unwrap();
            if *state != StoreState::Initialized || !self.config.end_connection_on_close {
                return Ok(());
            }
            *state = StoreState::Closing;
        }

        self.backend.close()?;
        *self.state.lock().unwrap() = StoreState::Closed;
        debug!("Session store closed");
        Ok(())
    }

    /// Fetch a session payload by id.
    ///
    /// Returns `Ok(None)` when no row exists, and also when a row exists
    /// but is past its expiry (the row is left in place for the sweeper).
    /// A malformed stored payload is an error for this call.
    pub async fn get(&self, session_id: &str) -> Result<Option<Value>> {
        let sql = format!(
            "SELECT {data}, {expires} FROM {table} WHERE {sid} = ?1",
            data = self.idents.data,
            expires = self.idents.expires,
            table = self.idents.table,
            sid = self.idents.session_id,
        );
        let rows = self.query(&sql, &[SqlValue::from(session_id)])?;

        // An empty result set means the session does not exist.
        let Some(row) = rows.into_iter().next() else {
            trace!(session_id = %session_id, "Session not found");
            return Ok(None);
        };

        let expires = row.get(1).and_then(SqlValue::as_i64).ok_or_else(|| {
            Error::InvalidRow(format!("non-integer expires column for session {session_id}"))
        })?;
        if expires < Utc::now().timestamp() {
            debug!(session_id = %session_id, expires, "Session past expiry, treating as absent");
            return Ok(None);
        }

        match row.first() {
            Some(SqlValue::Text(text)) => Ok(Some(serde_json::from_str(text)?)),
            Some(SqlValue::Null) | None => {
                trace!(session_id = %session_id, "Session row has no payload");
                Ok(None)
            }
            Some(other) => Err(Error::InvalidRow(format!(
                "unexpected data column type for session {session_id}: {other:?}"
            ))),
        }
    }

    /// Store a session payload under the given id (insert or update).
    ///
    /// The expiry comes from the payload's `cookie.expires` /
    /// `cookie._expires` fields when present, else `now + expiration`.
    pub async fn set(&self, session_id: &str, data: &Value) -> Result<()> {
        let expires = session_expiry(data, self.config.expiration, Utc::now());
        let payload = serde_json::to_string(data)?;

        let sql = format!(
            "INSERT INTO {table} ({sid}, {expires}, {data}) VALUES (?1, ?2, ?3) \
             ON CONFLICT ({sid}) DO UPDATE SET {expires} = excluded.{expires}, {data} = excluded.{data}",
            table = self.idents.table,
            sid = self.idents.session_id,
            expires = self.idents.expires,
            data = self.idents.data,
        );
        self.query(
            &sql,
            &[
                SqlValue::from(session_id),
                SqlValue::Integer(expires),
                SqlValue::Text(payload),
            ],
        )?;

        debug!(session_id = %session_id, expires, "Session stored");
        Ok(())
    }

    /// Extend a session's expiry without rewriting its payload.
    ///
    /// No-op when touch is disabled by configuration. The new expiry is
    /// computed with the same rule as [`set`](SessionStore::set).
    pub async fn touch(&self, session_id: &str, data: &Value) -> Result<()> {
        if self.config.disable_touch {
            trace!(session_id = %session_id, "Touch disabled, skipping");
            return Ok(());
        }

        let expires = session_expiry(data, self.config.expiration, Utc::now());
        let sql = format!(
            "UPDATE {table} SET {exp} = ?1 WHERE {sid} = ?2",
            table = self.idents.table,
            exp = self.idents.expires,
            sid = self.idents.session_id,
        );
        self.query(
            &sql,
            &[SqlValue::Integer(expires), SqlValue::from(session_id)],
        )?;

        trace!(session_id = %session_id, expires, "Session touched");
        Ok(())
    }

    /// Delete a session by id.
    pub async fn destroy(&self, session_id: &str) -> Result<()> {
        debug!(session_id = %session_id, "Destroying session");

        let sql = format!(
            "DELETE FROM {table} WHERE {sid} = ?1",
            table = self.idents.table,
            sid = self.idents.session_id,
        );
        self.query(&sql, &[SqlValue::from(session_id)])?;

        debug!(session_id = %session_id, "Session destroyed");
        Ok(())
    }

    /// Count non-expired sessions.
    pub async fn length(&self) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM {table} WHERE {exp} >= ?1",
            table = self.idents.table,
            exp = self.idents.expires,
        );
        let rows = self.query(&sql, &[SqlValue::Integer(Utc::now().timestamp())])?;

        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64)
            .ok_or_else(|| Error::InvalidRow("COUNT query returned no rows".to_string()))?;
        Ok(count as usize)
    }

    /// Fetch all non-expired sessions as an id → payload map.
    ///
    /// Rows with malformed payloads are logged and skipped; the call still
    /// succeeds for the remaining rows.
    pub async fn all(&self) -> Result<HashMap<String, Value>> {
        let sql = format!(
            "SELECT {sid}, {data} FROM {table} WHERE {exp} >= ?1",
            sid = self.idents.session_id,
            data = self.idents.data,
            table = self.idents.table,
            exp = self.idents.expires,
        );
        let rows = self.query(&sql, &[SqlValue::Integer(Utc::now().timestamp())])?;

        let mut sessions = HashMap::with_capacity(rows.len());
        for row in rows {
            let Some(id) = row.first().and_then(SqlValue::as_str) else {
                warn!("Skipping session row with non-text id");
                continue;
            };
            match row.get(1).and_then(SqlValue::as_str) {
                Some(text) => match serde_json::from_str::<Value>(text) {
                    Ok(value) => {
                        sessions.insert(id.to_string(), value);
                    }
                    Err(e) => {
                        warn!(session_id = %id, error = %e, "Skipping session with malformed payload");
                    }
                },
                None => {
                    warn!(session_id = %id, "Skipping session with missing payload");
                }
            }
        }
        Ok(sessions)
    }

    /// Delete every row in the session table.
    pub async fn clear(&self) -> Result<()> {
        let sql = format!("DELETE FROM {table}", table = self.idents.table);
        self.query(&sql, &[])?;

        debug!("Session table cleared");
        Ok(())
    }

    /// The one query-execution primitive every operation funnels through:
    /// delegates to the backend and logs failures.
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        self.backend.query(sql, params).map_err(|e| {
            error!(error = %e, "Session query failed");
            Error::Backend(e)
        })
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.state())
            .field("table", &self.config.schema.table_name)
            .finish_non_exhaustive()
    }
}

/// Pre-quoted SQL identifiers for the configured table and columns.
///
/// Identifiers cannot be bound as parameters, so they are escaped once here
/// and never concatenated raw.
#[derive(Debug, Clone)]
struct SqlIdents {
    table: String,
    session_id: String,
    expires: String,
    data: String,
}

impl SqlIdents {
    fn from_schema(schema: &Schema) -> Self {
        Self {
            table: quote_ident(&schema.table_name),
            session_id: quote_ident(&schema.column_names.session_id),
            expires: quote_ident(&schema.column_names.expires),
            data: quote_ident(&schema.column_names.data),
        }
    }

    /// Statement used by the sweeper; strict `<` so boundary-equal rows
    /// survive until the next second tick, the inverse of `length`/`all`.
    fn delete_expired_sql(&self) -> String {
        format!(
            "DELETE FROM {table} WHERE {exp} < ?1",
            table = self.table,
            exp = self.expires,
        )
    }
}

/// Quote an identifier, escaping embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Issue the idempotent session-table DDL. The key column gets a
/// binary-comparable collation for exact id matching, and the configured
/// charset selects the database text encoding where the engine supports it.
fn create_sessions_table(
    backend: &dyn SessionBackend,
    idents: &SqlIdents,
    charset: &str,
) -> std::result::Result<(), BackendError> {
    match encoding_pragma(charset) {
        // Takes effect only before the first table is created; SQLite
        // ignores it afterwards.
        Some(encoding) => {
            backend.query(&format!("PRAGMA encoding = '{encoding}'"), &[])?;
        }
        None => {
            warn!(charset = %charset, "Unrecognized charset, using database default encoding");
        }
    }

    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
         {sid} VARCHAR(128) NOT NULL COLLATE BINARY, \
         {exp} INTEGER NOT NULL, \
         {data} TEXT, \
         PRIMARY KEY ({sid}))",
        table = idents.table,
        sid = idents.session_id,
        exp = idents.expires,
        data = idents.data,
    );
    backend.query(&sql, &[])?;
    Ok(())
}

/// Map a configured charset to a SQLite `PRAGMA encoding` value. The utf8
/// family (including MySQL-style names like `utf8mb4` or `utf8mb4_bin`)
/// maps to UTF-8.
fn encoding_pragma(charset: &str) -> Option<&'static str> {
    let normalized = charset.to_ascii_lowercase().replace(['-', '_'], "");
    if normalized.starts_with("utf8") {
        return Some("UTF-8");
    }
    match normalized.as_str() {
        "utf16le" => Some("UTF-16le"),
        "utf16be" => Some("UTF-16be"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_store() -> SessionStore {
        SessionStore::open_in_memory(StoreOptions {
            // Keep timers out of unit tests; sweeper has its own
            clear_expired: Some(false),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_encoding_pragma_mapping() {
        assert_eq!(encoding_pragma("utf8mb4"), Some("UTF-8"));
        assert_eq!(encoding_pragma("utf8mb4_bin"), Some("UTF-8"));
        assert_eq!(encoding_pragma("UTF-8"), Some("UTF-8"));
        assert_eq!(encoding_pragma("utf16le"), Some("UTF-16le"));
        assert_eq!(encoding_pragma("UTF-16be"), Some("UTF-16be"));
        assert_eq!(encoding_pragma("latin1"), None);
    }

    #[tokio::test]
    async fn test_charset_applied_during_table_setup() {
        let store = SessionStore::open_in_memory(StoreOptions {
            clear_expired: Some(false),
            charset: Some("utf16le".to_string()),
            ..Default::default()
        })
        .unwrap();
        store.on_ready().await.unwrap();

        store.set("sid-1", &json!({"user": 1})).await.unwrap();
        assert_eq!(store.get("sid-1").await.unwrap().unwrap(), json!({"user": 1}));
    }

    #[tokio::test]
    async fn test_unknown_charset_does_not_block_init() {
        let store = SessionStore::open_in_memory(StoreOptions {
            clear_expired: Some(false),
            charset: Some("latin1".to_string()),
            ..Default::default()
        })
        .unwrap();

        // Init logs the unrecognized charset and proceeds with the
        // database default encoding
        store.on_ready().await.unwrap();
        assert_eq!(store.state(), StoreState::Initialized);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("sessions"), "\"sessions\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[tokio::test]
    async fn test_ready_and_state() {
        let store = test_store();
        store.on_ready().await.unwrap();
        assert_eq!(store.state(), StoreState::Initialized);

        // Waiters registered after readiness resolve immediately
        store.on_ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = test_store();
        store.on_ready().await.unwrap();

        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = test_store();
        store.on_ready().await.unwrap();

        let data = json!({"user": 1, "cart": ["a", "b"]});
        store.set("sid-1", &data).await.unwrap();

        let fetched = store.get("sid-1").await.unwrap().unwrap();
        assert_eq!(fetched, data);
    }

    #[tokio::test]
    async fn test_set_is_upsert() {
        let store = test_store();
        store.on_ready().await.unwrap();

        store.set("sid-1", &json!({"v": 1})).await.unwrap();
        store.set("sid-1", &json!({"v": 2})).await.unwrap();

        assert_eq!(store.length().await.unwrap(), 1);
        assert_eq!(store.get("sid-1").await.unwrap().unwrap(), json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_expired_row_reads_as_none_but_stays() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let store = SessionStore::with_backend(
            StoreOptions {
                clear_expired: Some(false),
                ..Default::default()
            },
            backend.clone(),
        )
        .unwrap();
        store.on_ready().await.unwrap();

        let past = Utc::now().timestamp() - 60;
        backend
            .query(
                "INSERT INTO sessions (session_id, expires, data) VALUES (?1, ?2, ?3)",
                &[
                    SqlValue::from("stale"),
                    SqlValue::Integer(past),
                    SqlValue::from("{\"user\":9}"),
                ],
            )
            .unwrap();

        assert!(store.get("stale").await.unwrap().is_none());

        // The row is NOT deleted by get; only the sweeper removes it
        let rows = backend
            .query("SELECT COUNT(*) FROM sessions", &[])
            .unwrap();
        assert_eq!(rows[0][0], SqlValue::Integer(1));

        // And it does not count toward length
        assert_eq!(store.length().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_malformed_payload_is_error() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let store = SessionStore::with_backend(
            StoreOptions {
                clear_expired: Some(false),
                ..Default::default()
            },
            backend.clone(),
        )
        .unwrap();
        store.on_ready().await.unwrap();

        let future = Utc::now().timestamp() + 600;
        backend
            .query(
                "INSERT INTO sessions (session_id, expires, data) VALUES (?1, ?2, ?3)",
                &[
                    SqlValue::from("bad"),
                    SqlValue::Integer(future),
                    SqlValue::from("not json"),
                ],
            )
            .unwrap();

        assert!(matches!(
            store.get("bad").await,
            Err(Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_touch_updates_expiry_only() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let store = SessionStore::with_backend(
            StoreOptions {
                clear_expired: Some(false),
                ..Default::default()
            },
            backend.clone(),
        )
        .unwrap();
        store.on_ready().await.unwrap();

        let data = json!({"user": 1});
        store.set("sid-1", &data).await.unwrap();

        let before = backend
            .query("SELECT expires, data FROM sessions WHERE session_id = 'sid-1'", &[])
            .unwrap();

        // Touch with a later explicit expiry; payload argument differs on
        // purpose to prove it is not rewritten
        let later_ms = (Utc::now().timestamp() + 7200) * 1000;
        store
            .touch("sid-1", &json!({"cookie": {"expires": later_ms}, "user": 2}))
            .await
            .unwrap();

        let after = backend
            .query("SELECT expires, data FROM sessions WHERE session_id = 'sid-1'", &[])
            .unwrap();

        assert_ne!(before[0][0], after[0][0]);
        // Payload bytes unchanged
        assert_eq!(before[0][1], after[0][1]);
    }

    #[tokio::test]
    async fn test_touch_disabled_is_noop() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let store = SessionStore::with_backend(
            StoreOptions {
                clear_expired: Some(false),
                disable_touch: Some(true),
                ..Default::default()
            },
            backend.clone(),
        )
        .unwrap();
        store.on_ready().await.unwrap();

        store.set("sid-1", &json!({"user": 1})).await.unwrap();
        let before = backend
            .query("SELECT expires FROM sessions WHERE session_id = 'sid-1'", &[])
            .unwrap();

        let later_ms = (Utc::now().timestamp() + 7200) * 1000;
        store
            .touch("sid-1", &json!({"cookie": {"expires": later_ms}}))
            .await
            .unwrap();

        let after = backend
            .query("SELECT expires FROM sessions WHERE session_id = 'sid-1'", &[])
            .unwrap();
        assert_eq!(before[0][0], after[0][0]);
    }

    #[tokio::test]
    async fn test_destroy() {
        let store = test_store();
        store.on_ready().await.unwrap();

        store.set("sid-1", &json!({"user": 1})).await.unwrap();
        store.destroy("sid-1").await.unwrap();

        assert!(store.get("sid-1").await.unwrap().is_none());

        // Destroying a missing session is not an error
        store.destroy("sid-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_length_counts_only_live_rows() {
        let store = test_store();
        store.on_ready().await.unwrap();

        assert_eq!(store.length().await.unwrap(), 0);

        store.set("a", &json!({})).await.unwrap();
        assert_eq!(store.length().await.unwrap(), 1);

        store.set("b", &json!({})).await.unwrap();
        assert_eq!(store.length().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_all_skips_malformed_rows() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let store = SessionStore::with_backend(
            StoreOptions {
                clear_expired: Some(false),
                ..Default::default()
            },
            backend.clone(),
        )
        .unwrap();
        store.on_ready().await.unwrap();

        store.set("good", &json!({"user": 1})).await.unwrap();

        let future = Utc::now().timestamp() + 600;
        backend
            .query(
                "INSERT INTO sessions (session_id, expires, data) VALUES (?1, ?2, ?3)",
                &[
                    SqlValue::from("bad"),
                    SqlValue::Integer(future),
                    SqlValue::from("{broken"),
                ],
            )
            .unwrap();

        let sessions = store.all().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions["good"], json!({"user": 1}));
    }

    #[tokio::test]
    async fn test_all_empty_table() {
        let store = test_store();
        store.on_ready().await.unwrap();

        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = test_store();
        store.on_ready().await.unwrap();

        store.set("a", &json!({})).await.unwrap();
        store.set("b", &json!({})).await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(store.length().await.unwrap(), 0);
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_schema_names() {
        let store = SessionStore::open_in_memory(StoreOptions {
            clear_expired: Some(false),
            schema: Some(crate::config::SchemaOptions {
                table_name: Some("app_sessions".to_string()),
                column_names: std::collections::HashMap::from([
                    ("session_id".to_string(), "sid".to_string()),
                    ("expires".to_string(), "valid_until".to_string()),
                    ("data".to_string(), "payload".to_string()),
                ]),
            }),
            ..Default::default()
        })
        .unwrap();
        store.on_ready().await.unwrap();

        let data = json!({"user": 1});
        store.set("sid-1", &data).await.unwrap();
        assert_eq!(store.get("sid-1").await.unwrap().unwrap(), data);
        assert_eq!(store.length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bad_column_key_fails_before_any_query() {
        struct PanickyBackend;
        impl SessionBackend for PanickyBackend {
            fn query(&self, _sql: &str, _params: &[SqlValue]) -> seshat_backend::Result<Vec<SqlRow>> {
                panic!("no query may execute for an invalid configuration");
            }
        }

        let result = SessionStore::with_backend(
            StoreOptions {
                schema: Some(crate::config::SchemaOptions {
                    table_name: None,
                    column_names: std::collections::HashMap::from([(
                        "bogus".to_string(),
                        "x".to_string(),
                    )]),
                }),
                ..Default::default()
            },
            Arc::new(PanickyBackend),
        );

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_rejected_at_construction() {
        // A zero interval cannot drive the sweeper timer; it must fail
        // up front rather than leave clear_expired silently inoperative.
        let result = SessionStore::open_in_memory(StoreOptions {
            clear_expired: Some(true),
            check_expiration_interval: Some(0),
            ..Default::default()
        });

        assert!(matches!(
            result,
            Err(Error::Config(crate::error::ConfigError::ZeroCheckExpirationInterval))
        ));
    }

    #[tokio::test]
    async fn test_init_failure_rejects_ready_waiters() {
        struct FailingBackend;
        impl SessionBackend for FailingBackend {
            fn query(&self, _sql: &str, _params: &[SqlValue]) -> seshat_backend::Result<Vec<SqlRow>> {
                Err(BackendError::ConnectionClosed)
            }
        }

        let store =
            SessionStore::with_backend(StoreOptions::default(), Arc::new(FailingBackend)).unwrap();

        assert!(matches!(store.on_ready().await, Err(Error::Init(_))));
        assert_ne!(store.state(), StoreState::Initialized);
        // The sweeper never starts when init fails
        assert!(!store.sweeper_running());
    }

    #[tokio::test]
    async fn test_skip_table_creation() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let store = SessionStore::with_backend(
            StoreOptions {
                create_database_table: Some(false),
                clear_expired: Some(false),
                ..Default::default()
            },
            backend.clone(),
        )
        .unwrap();

        // Init skips DDL and still reaches readiness
        store.on_ready().await.unwrap();

        // But CRUD fails because the table was never created
        assert!(store.get("x").await.is_err());
    }

    #[tokio::test]
    async fn test_close_owned_backend() {
        let store = test_store();
        store.on_ready().await.unwrap();

        store.close().await.unwrap();
        assert_eq!(store.state(), StoreState::Closed);
        assert!(!store.sweeper_running());

        // Operations after close fail instead of panicking
        assert!(store.get("x").await.is_err());
    }

    #[tokio::test]
    async fn test_close_injected_backend_keeps_connection() {
        let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
        let store = SessionStore::with_backend(
            StoreOptions {
                clear_expired: Some(false),
                // Caller-supplied value is overridden for injected backends
                end_connection_on_close: Some(true),
                ..Default::default()
            },
            backend.clone(),
        )
        .unwrap();
        store.on_ready().await.unwrap();
        assert!(!store.config().end_connection_on_close);

        store.close().await.unwrap();
        assert!(backend.is_open());
        // Never reached Closed: the store does not own the connection
        assert_eq!(store.state(), StoreState::Initialized);
    }

    #[tokio::test]
    async fn test_sweeper_starts_with_store() {
        let store = SessionStore::open_in_memory(StoreOptions {
            clear_expired: Some(true),
            check_expiration_interval: Some(50),
            ..Default::default()
        })
        .unwrap();
        store.on_ready().await.unwrap();
        assert!(store.sweeper_running());

        store.close().await.unwrap();
        assert!(!store.sweeper_running());
    }

    #[tokio::test]
    async fn test_set_expiration_interval_rearms() {
        let store = test_store();
        store.on_ready().await.unwrap();
        assert!(!store.sweeper_running());

        store.set_expiration_interval(Duration::from_millis(50));
        assert!(store.sweeper_running());

        store.set_expiration_interval(Duration::from_millis(100));
        assert!(store.sweeper_running());

        store.close().await.unwrap();
    }
}
