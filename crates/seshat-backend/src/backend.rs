//! The backend trait: one query primitive, nothing else.

use crate::error::Result;
use crate::value::SqlValue;

/// A single row returned by a query.
pub type SqlRow = Vec<SqlValue>;

/// A relational engine capable of executing one parameterized statement.
///
/// Implement this trait to back the session store with a different engine
/// or an externally managed connection pool. All statements the store issues
/// funnel through [`query`](SessionBackend::query); parameters are always
/// bound, never spliced into the SQL text.
pub trait SessionBackend: Send + Sync {
    /// Execute one SQL statement with the given bound parameters.
    ///
    /// Statements that produce no rows (INSERT, UPDATE, DELETE, DDL) return
    /// an empty vector.
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>>;

    /// Release the underlying connection.
    ///
    /// Default implementation does nothing, for backends whose connection
    /// lifetime is managed by their owner rather than the store.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}
