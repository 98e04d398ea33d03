//! Core types for the Tombstone persistence layer.
//!
//! This crate is the host side of the lifecycle hooks: entity mapping
//! metadata, an explicit listener registry, and a unit of work that turns
//! pending entity changes into a [`plan::FlushPlan`]. It has no database
//! dependency; storage backends (e.g. `tombstone-store-sqlite`) execute the
//! plans it produces.

pub mod entity;
pub mod error;
pub mod event;
pub mod manager;
pub mod metadata;
pub mod plan;
pub mod unit_of_work;
pub mod value;

pub use entity::{Entity, EntityKey};
pub use error::{Error, Result};
pub use event::{Event, EventManager, Listener};
pub use manager::EntityManager;
pub use metadata::{EntityMetadata, FieldMapping};
pub use plan::{FlushPlan, Statement};
pub use unit_of_work::{ChangeSet, EntityState, UnitOfWork};
pub use value::{FieldType, Row, Timestamp, Value};

#[cfg(test)]
mod tests;
