//! The [`Entity`] trait and identity keys.

use std::{any::Any, fmt};

use serde::Serialize;

use crate::{
  Result,
  metadata::EntityMetadata,
  value::{Row, Value},
};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Identity-map key: the mapped entity name plus its integer identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntityKey {
  pub entity: String,
  pub id:     i64,
}

impl EntityKey {
  pub fn new(entity: impl Into<String>, id: i64) -> Self {
    Self { entity: entity.into(), id }
  }
}

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.entity, self.id)
  }
}

// ─── Downcasting ─────────────────────────────────────────────────────────────

/// Access to the concrete type behind a `dyn Entity`.
///
/// Implemented for every `'static` type. Call it on `&dyn Entity` /
/// `&mut dyn Entity`, never on a `Box`, or the box itself is what gets cast.
pub trait AsAny: Any {
  fn as_any(&self) -> &dyn Any;
  fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
  fn as_any(&self) -> &dyn Any { self }

  fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// A persisted object type.
///
/// The static half (`describe`, `hydrate`) is used by the metadata factory
/// and by loaders; the object-safe half is what the unit of work uses for
/// change tracking once an entity is boxed into the identity map.
pub trait Entity: AsAny + fmt::Debug + Send {
  /// The type's mapping, before any metadata listener has run.
  fn describe() -> EntityMetadata
  where
    Self: Sized;

  /// Build an entity from a row of field values.
  fn hydrate(row: &Row) -> Result<Self>
  where
    Self: Sized;

  fn id(&self) -> i64;

  /// Current value of a mapped field, or `None` if the type has no such
  /// field.
  fn get(&self, field: &str) -> Option<Value>;

  fn set(&mut self, field: &str, value: Value) -> Result<()>;
}

/// Snapshot every field mapped in `metadata` from `entity`. Fields the
/// entity does not expose read as `Null`.
pub fn snapshot(entity: &dyn Entity, metadata: &EntityMetadata) -> Row {
  metadata
    .fields()
    .iter()
    .map(|f| {
      let value = entity.get(&f.field_name).unwrap_or(Value::Null);
      (f.field_name.clone(), value)
    })
    .collect()
}
