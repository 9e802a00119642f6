//! Tracked entity state
//!
//! Lifecycle of an entity inside one unit of work:
//!
//! ```text
//!   New ──persist──▶ Managed ──persist──▶ Dirty ──flush──▶ Flushed
//!                      │  ▲                 │                 │
//!                      │  └──── find ───────┼──── persist ────┘ (▶ Dirty)
//!                      └──remove──▶ Removed ─┘──flush──▶ (untracked)
//! ```
//!
//! A `Managed` entity whose first persist is still staged stays `Managed`
//! when persisted again; only a loaded or flushed entity turns `Dirty`.

use std::any::Any;
use std::sync::Arc;

use crate::error::Result;
use crate::hydrator::{dehydrate, EntityRecord};
use crate::metadata::{Entity, EntityMetadata};

/// Where an entity stands in the unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Not tracked by this object manager
    New,
    /// Tracked; either loaded or persisted for the first time
    Managed,
    /// Tracked and changed again after being loaded, persisted or flushed
    Dirty,
    /// Scheduled for deletion
    Removed,
    /// Written by the last flush
    Flushed,
}

/// Store operation a staged entry resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

/// Type-erased entity held by the unit of work
pub(crate) trait StagedEntity: Send + Sync {
    fn dehydrate(&self, metadata: &EntityMetadata) -> Result<EntityRecord>;

    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> StagedEntity for E {
    fn dehydrate(&self, metadata: &EntityMetadata) -> Result<EntityRecord> {
        dehydrate(self, metadata)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One tracked entity
pub(crate) struct Tracked {
    pub metadata: Arc<EntityMetadata>,

    /// Copy of the entity taken at the last persist/remove/load
    pub entity: Box<dyn StagedEntity>,

    pub state: EntityState,

    /// Last known stored record; `None` if never stored
    pub snapshot: Option<EntityRecord>,
}

impl Tracked {
    pub fn operation(&self) -> Operation {
        match (self.state, &self.snapshot) {
            (EntityState::Removed, _) => Operation::Delete,
            (_, None) => Operation::Insert,
            (_, Some(_)) => Operation::Update,
        }
    }

    pub fn downcast<E: Entity>(&self) -> Option<E> {
        self.entity.as_any().downcast_ref::<E>().cloned()
    }
}
