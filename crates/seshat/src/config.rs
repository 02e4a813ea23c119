//! Configuration for the session store.
//!
//! Options arrive as all-optional partial structs ([`StoreOptions`],
//! [`SchemaOptions`]) so partial configs can be loaded and layered; they are
//! merged over defaults with one explicit merge per nesting level (top-level,
//! schema, column names). Column-name overrides are validated against the
//! three allowed keys before any SQL runs.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default table name for session rows.
pub const DEFAULT_TABLE_NAME: &str = "sessions";

/// Default session TTL when the payload carries no explicit expiry (24h).
pub const DEFAULT_EXPIRATION_MS: u64 = 86_400_000;

/// Default interval between expiration sweeps (15 min).
pub const DEFAULT_CHECK_EXPIRATION_INTERVAL_MS: u64 = 900_000;

/// Default table charset. During table setup this selects the database
/// text encoding where the engine supports it (SQLite: `PRAGMA encoding`,
/// effective only before the first table exists); the key column is always
/// created with a binary-comparable collation regardless.
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// Partial store options. Every field is optional so that a caller (or a
/// deserialized config file) can override only what it needs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Whether the background expiration sweeper runs.
    pub clear_expired: Option<bool>,

    /// Milliseconds between expiration sweeps.
    pub check_expiration_interval: Option<u64>,

    /// Default session TTL in milliseconds, used when the payload carries
    /// no explicit expiry.
    pub expiration: Option<u64>,

    /// Whether to issue `CREATE TABLE IF NOT EXISTS` during init.
    pub create_database_table: Option<bool>,

    /// Whether `close()` releases the backend connection. Forced by
    /// backend ownership at construction time; a caller-supplied value is
    /// overridden (the store never closes a connection it does not own).
    pub end_connection_on_close: Option<bool>,

    /// Whether `touch` is a no-op.
    pub disable_touch: Option<bool>,

    /// Table charset.
    pub charset: Option<String>,

    /// Table and column naming overrides.
    pub schema: Option<SchemaOptions>,
}

/// Partial schema options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    /// Table name override.
    pub table_name: Option<String>,

    /// Column name overrides, keyed by logical column. Only the keys
    /// `session_id`, `expires` and `data` are accepted; anything else
    /// rejects the whole configuration (a typo here would otherwise become
    /// an invisible no-op column).
    pub column_names: HashMap<String, String>,
}

/// Fully resolved store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether the background expiration sweeper runs.
    pub clear_expired: bool,

    /// Milliseconds between expiration sweeps.
    pub check_expiration_interval: u64,

    /// Default session TTL in milliseconds.
    pub expiration: u64,

    /// Whether to issue `CREATE TABLE IF NOT EXISTS` during init.
    pub create_database_table: bool,

    /// Whether `close()` releases the backend connection.
    pub end_connection_on_close: bool,

    /// Whether `touch` is a no-op.
    pub disable_touch: bool,

    /// Table charset (see [`DEFAULT_CHARSET`]).
    pub charset: String,

    /// Table and column naming.
    pub schema: Schema,
}

/// Table and column naming.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Name of the session table.
    pub table_name: String,

    /// Names of the three logical columns.
    pub column_names: ColumnNames,
}

/// Names of the three logical columns of the session table.
#[derive(Debug, Clone)]
pub struct ColumnNames {
    /// Primary key column holding the opaque session id.
    pub session_id: String,

    /// Expiry column, integer Unix seconds.
    pub expires: String,

    /// Payload column, serialized session data as text.
    pub data: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            clear_expired: true,
            check_expiration_interval: DEFAULT_CHECK_EXPIRATION_INTERVAL_MS,
            expiration: DEFAULT_EXPIRATION_MS,
            create_database_table: true,
            end_connection_on_close: false,
            disable_touch: false,
            charset: DEFAULT_CHARSET.to_string(),
            schema: Schema::default(),
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            column_names: ColumnNames::default(),
        }
    }
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            session_id: "session_id".to_string(),
            expires: "expires".to_string(),
            data: "data".to_string(),
        }
    }
}

impl StoreConfig {
    /// Resolve a full configuration from partial options merged over
    /// defaults. Fails if a column-name override uses an unknown key.
    pub fn from_options(options: StoreOptions) -> std::result::Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge(options)?;
        Ok(config)
    }

    /// Merge partial options on top of this configuration (options take
    /// priority). Nested sections merge independently, so a partial schema
    /// override does not drop unspecified column names.
    pub fn merge(&mut self, options: StoreOptions) -> std::result::Result<(), ConfigError> {
        if let Some(v) = options.clear_expired {
            self.clear_expired = v;
        }
        if let Some(v) = options.check_expiration_interval {
            if v == 0 {
                return Err(ConfigError::ZeroCheckExpirationInterval);
            }
            self.check_expiration_interval = v;
        }
        if let Some(v) = options.expiration {
            self.expiration = v;
        }
        if let Some(v) = options.create_database_table {
            self.create_database_table = v;
        }
        if let Some(v) = options.end_connection_on_close {
            self.end_connection_on_close = v;
        }
        if let Some(v) = options.disable_touch {
            self.disable_touch = v;
        }
        if let Some(v) = options.charset {
            self.charset = v;
        }
        if let Some(schema) = options.schema {
            self.schema.merge(schema)?;
        }
        Ok(())
    }
}

impl Schema {
    fn merge(&mut self, options: SchemaOptions) -> std::result::Result<(), ConfigError> {
        if let Some(v) = options.table_name {
            self.table_name = v;
        }
        self.column_names.merge(options.column_names)
    }
}

impl ColumnNames {
    fn merge(
        &mut self,
        overrides: HashMap<String, String>,
    ) -> std::result::Result<(), ConfigError> {
        for (key, value) in overrides {
            match key.as_str() {
                "session_id" => self.session_id = value,
                "expires" => self.expires = value,
                "data" => self.data = value,
                _ => return Err(ConfigError::UnknownColumnName { key }),
            }
        }
        Ok(())
    }
}
