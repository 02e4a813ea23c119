//! Query-execution backends for the seshat session store.
//!
//! This crate defines the seam between the session store and whatever
//! relational engine holds the session table:
//! - [`SessionBackend`]: a single `query(sql, params) -> rows` capability
//!   with parameters bound as placeholders, never interpolated
//! - [`SqlValue`]: the value type crossing that seam in both directions
//! - [`SqliteBackend`]: a rusqlite-based implementation
//!
//! The store never talks to a database driver directly; every statement it
//! issues goes through a [`SessionBackend`].

mod backend;
mod error;
mod sqlite;
mod value;

pub use backend::{SessionBackend, SqlRow};
pub use error::{BackendError, Result};
pub use sqlite::SqliteBackend;
pub use value::SqlValue;
