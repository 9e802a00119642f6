//! Error types for AtlasOM
//!
//! Provides a unified error type for all operations. Per-entity failures
//! collected during a flush are reported together through [`FlushError`].

use std::fmt;

use thiserror::Error;

/// Result type alias using OmError
pub type Result<T> = std::result::Result<T, OmError>;

/// Unified error type for AtlasOM operations
#[derive(Debug, Error)]
pub enum OmError {
    // -------------------------------------------------------------------------
    // Mapping Errors
    // -------------------------------------------------------------------------
    #[error("Entity type {type_name} carries no mapping declaration")]
    UnmappedEntity { type_name: String },

    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("Field '{field}' expects {expected}, got {found}")]
    FieldType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Entity {type_name} has no value for identity field '{field}'")]
    MissingIdentity { type_name: String, field: String },

    #[error("Entity {type_name} has composite identity field '{field}' holding separator: {value:?}")]
    InvalidIdentity {
        type_name: String,
        field: String,
        value: String,
    },

    // -------------------------------------------------------------------------
    // Unit of Work Errors
    // -------------------------------------------------------------------------
    #[error("Entity {key} is not managed by this object manager")]
    NotManaged { key: String },

    #[error(transparent)]
    Flush(#[from] FlushError),

    // -------------------------------------------------------------------------
    // Decode Errors
    // -------------------------------------------------------------------------
    #[error("Cannot decode field '{field}' of {key}: {reason}")]
    Decode {
        key: String,
        field: String,
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Field '{field}' of {type_name} is not indexed")]
    NotIndexed { type_name: String, field: String },

    #[error("No index schema generated for {type_name}")]
    IndexMissing { type_name: String },

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OmError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, OmError::StoreUnavailable(_) | OmError::Io(_))
    }

    pub(crate) fn decode(key: &str, field: &str, reason: impl Into<String>) -> Self {
        OmError::Decode {
            key: key.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// A single entity that could not be flushed
#[derive(Debug)]
pub struct EntityFailure {
    /// Primary key of the entity
    pub key: String,

    /// Mapped type name of the entity
    pub type_name: String,

    /// The error that aborted this entity's writes
    pub error: OmError,
}

/// Aggregate of every per-entity failure from one flush call
///
/// Entities listed in `succeeded` are durable in the store. Entities listed
/// in `failed` keep their staged change and can be flushed again.
#[derive(Debug)]
pub struct FlushError {
    pub succeeded: Vec<String>,
    pub failed: Vec<EntityFailure>,
}

impl FlushError {
    /// Primary keys of the entities that failed
    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|f| f.key.as_str())
    }
}

impl fmt::Display for FlushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Flush failed for {} of {} entities",
            self.failed.len(),
            self.failed.len() + self.succeeded.len()
        )?;
        for failure in &self.failed {
            write!(f, "; {} ({}): {}", failure.key, failure.type_name, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for FlushError {}
