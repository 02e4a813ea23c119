//! SQL-backed HTTP session store with TTL expiration sweeping.
//!
//! This crate persists middleware session records in a relational table and
//! exposes the verb-per-method contract session middleware expects:
//! `get` / `set` / `touch` / `destroy` / `length` / `all` / `clear`, plus
//! lifecycle (`on_ready`, `close`) and a periodic background sweeper that
//! garbage-collects rows past their expiry.
//!
//! # Example
//!
//! ```rust,ignore
//! use seshat::{SessionStore, StoreOptions};
//!
//! let store = SessionStore::open(StoreOptions::default(), "sessions.db")?;
//! store.on_ready().await?;
//!
//! store.set("sid-1", &serde_json::json!({"user": 1})).await?;
//! let session = store.get("sid-1").await?;
//! ```

mod config;
mod error;
mod expiry;
mod store;
mod sweeper;

pub use config::{ColumnNames, Schema, SchemaOptions, StoreConfig, StoreOptions};
pub use error::{ConfigError, Error, Result};
pub use store::{SessionStore, StoreState};
pub use sweeper::Sweeper;

pub use seshat_backend::{BackendError, SessionBackend, SqlRow, SqlValue, SqliteBackend};
