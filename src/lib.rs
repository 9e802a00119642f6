//! # AtlasOM
//!
//! An object mapper that persists application entities as hashes in a
//! key-value store, with:
//! - Deterministic primary keys derived from identity fields
//! - Secondary indexes kept in step with records on every flush
//! - Type-level time-to-live
//! - A unit of work with partial-failure flush semantics
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Object Manager                            │
//! │        (Unit of Work: persist / remove / flush / find)       │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        │                  │                  │
//!        ▼                  ▼                  ▼
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │  Metadata   │    │  Hydrator   │    │    Index    │
//! │  Registry   │    │ (de/hydrate)│    │   Builder   │
//! └─────────────┘    └─────────────┘    └──────┬──────┘
//!                                              │
//! ┌─────────────────────────────────────────────▼───────────────┐
//! │                  Key-Value Client Adapter                    │
//! │            (MemoryClient | RedisClient over RESP)            │
//! └─────────────────────▲───────────────────────────────────────┘
//!                       │
//!               ┌───────┴───────┐
//!               │    Schema     │
//!               │   Generator   │
//!               └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod client;
pub mod metadata;
pub mod hydrator;
pub mod index;
pub mod manager;
pub mod schema;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FlushError, OmError, Result};
pub use config::Config;
pub use client::{KvClient, MemoryClient, RedisClient};
pub use metadata::{Entity, EntityMapping, MappedType, MetadataRegistry, StorageKind, Value};
pub use manager::{EntityState, ObjectManager};
pub use schema::SchemaGenerator;

// Re-exported for `inventory::submit!` in downstream crates
pub use inventory;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasOM
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
