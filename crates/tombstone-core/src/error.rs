//! Error types for `tombstone-core`.

use thiserror::Error;

use crate::{entity::EntityKey, value::FieldType};

#[derive(Debug, Error)]
pub enum Error {
  #[error("no metadata loaded for entity {0:?}")]
  UnknownEntity(String),

  #[error("entity {0} is not managed by this unit of work")]
  NotManaged(EntityKey),

  #[error("entity {0} is already managed")]
  AlreadyManaged(EntityKey),

  #[error("field {field:?} is already mapped on {entity}")]
  DuplicateField { entity: String, field: String },

  #[error("{entity} has no field {field:?}")]
  UnknownField { entity: String, field: String },

  #[error("field {field:?} expects {expected}, found {found}")]
  TypeMismatch {
    field:    String,
    expected: FieldType,
    found:    &'static str,
  },

  #[error("field {0:?} is not nullable")]
  UnexpectedNull(String),

  /// A listener failed for a reason of its own; host errors raised inside a
  /// listener are returned as-is instead.
  #[error("listener {listener} failed: {source}")]
  Listener {
    listener: &'static str,
    #[source]
    source:   Box<dyn std::error::Error + Send + Sync>,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
