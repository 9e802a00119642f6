//! Configuration for AtlasOM
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{OmError, Result};

/// Main configuration for an AtlasOM client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Store address (host:port)
    pub server_addr: String,

    /// Logical database selected after connecting
    pub database: u32,

    /// Connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Per-call read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Per-call write timeout (milliseconds)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Key Layout Configuration
    // -------------------------------------------------------------------------
    /// Namespace for schema marker keys
    /// Layout: {schema_namespace}:{prefix}
    pub schema_namespace: String,

    /// Namespace for secondary index sets
    /// Layout: {index_namespace}:{prefix}:{field}:{value}
    pub index_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6379".to_string(),
            database: 0,
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            schema_namespace: "schema".to_string(),
            index_namespace: "idx".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }

    /// Key layout derived from this config
    pub fn key_layout(&self) -> KeyLayout {
        KeyLayout {
            schema_namespace: self.schema_namespace.clone(),
            index_namespace: self.index_namespace.clone(),
        }
    }
}

/// Zero disables the timeout
fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store address (host:port)
    pub fn server_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server_addr = addr.into();
        self
    }

    /// Set the logical database index
    pub fn database(mut self, database: u32) -> Self {
        self.config.database = database;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the schema marker namespace
    pub fn schema_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.schema_namespace = namespace.into();
        self
    }

    /// Set the index namespace
    pub fn index_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.index_namespace = namespace.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Every key format used by the mapper
///
/// ```text
/// {prefix}:{id}                         entity record (hash)
/// {index_namespace}:{prefix}:{field}:{v} index set, members are record keys
/// {index_namespace}:{prefix}:{field}#null index set for null values
/// {schema_namespace}:{prefix}            schema marker (hash)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    schema_namespace: String,
    index_namespace: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Config::default().key_layout()
    }
}

impl KeyLayout {
    /// Primary key of a record
    pub fn record_key(prefix: &str, identity: &str) -> String {
        format!("{}:{}", prefix, identity)
    }

    /// Glob pattern matching every record of a prefix
    pub fn record_pattern(prefix: &str) -> String {
        format!("{}:*", escape_glob(prefix))
    }

    /// Strip the prefix from a record key, yielding the identity segment
    pub fn identity_of<'a>(prefix: &str, record_key: &'a str) -> Option<&'a str> {
        record_key
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(':'))
    }

    /// Index set for a field value; `None` selects the null index
    pub fn index_key(&self, prefix: &str, field: &str, value: Option<&str>) -> String {
        match value {
            Some(value) => format!("{}:{}:{}:{}", self.index_namespace, prefix, field, value),
            None => format!("{}:{}:{}#null", self.index_namespace, prefix, field),
        }
    }

    /// Glob pattern matching every index set of a prefix
    pub fn index_pattern(&self, prefix: &str) -> String {
        format!("{}:{}:*", escape_glob(&self.index_namespace), escape_glob(prefix))
    }

    /// Schema marker key of a prefix
    pub fn schema_key(&self, prefix: &str) -> String {
        format!("{}:{}", self.schema_namespace, prefix)
    }

    /// Reject a key prefix whose records would share a keyspace with the
    /// index sets or schema markers
    pub fn check_prefix(&self, prefix: &str) -> Result<()> {
        for namespace in [&self.index_namespace, &self.schema_namespace] {
            let nested = namespace
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'));
            if nested {
                return Err(OmError::InvalidMapping(format!(
                    "key prefix '{}' collides with namespace '{}'",
                    prefix, namespace
                )));
            }
        }
        Ok(())
    }

    /// Glob pattern matching every schema marker
    pub fn schema_pattern(&self) -> String {
        format!("{}:*", escape_glob(&self.schema_namespace))
    }
}

/// Escape glob metacharacters so `s` matches literally
pub fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
