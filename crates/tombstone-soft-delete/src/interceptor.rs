//! [`SoftDeleteInterceptor`]: the listener that implements soft deletes.

use std::{
  any::{Any, TypeId, type_name},
  collections::HashMap,
};

use tombstone_core::{
  ChangeSet, Entity, EntityMetadata, FieldMapping, FieldType, Result, UnitOfWork, Value,
  event::{Event, FlushArgs, LoadClassMetadataArgs, Listener},
};

use crate::soft_deletable::{DELETED_AT, DELETED_AT_COLUMN, SoftDeletable};

type Cast = fn(&mut dyn Any) -> Option<&mut dyn SoftDeletable>;

fn cast<T: SoftDeletable + 'static>(any: &mut dyn Any) -> Option<&mut dyn SoftDeletable> {
  any
    .downcast_mut::<T>()
    .map(|entity| entity as &mut dyn SoftDeletable)
}

/// Maps `deletedAt` onto soft-deletable types and converts their scheduled
/// deletions into updates.
///
/// Which types are soft-deletable is fixed when the interceptor is built:
/// only types passed to [`SoftDeleteInterceptor::with`] are affected, and
/// the compiler checks that they implement [`SoftDeletable`].
#[derive(Debug, Clone, Default)]
pub struct SoftDeleteInterceptor {
  capabilities: HashMap<TypeId, Cast>,
  names:        Vec<&'static str>,
}

impl SoftDeleteInterceptor {
  pub fn new() -> Self { Self::default() }

  pub fn with<T: Entity + SoftDeletable>(mut self) -> Self {
    self.register::<T>();
    self
  }

  pub fn register<T: Entity + SoftDeletable>(&mut self) {
    if self.capabilities.insert(TypeId::of::<T>(), cast::<T>).is_none() {
      self.names.push(type_name::<T>());
    }
  }

  pub fn is_soft_deletable(&self, type_id: TypeId) -> bool {
    self.capabilities.contains_key(&type_id)
  }

  /// Registered type names, in registration order.
  pub fn registered(&self) -> &[&'static str] { &self.names }

  fn cast_for(&self, metadata: &EntityMetadata) -> Option<Cast> {
    let reflection = metadata.reflection()?;
    self.capabilities.get(&reflection.type_id).copied()
  }

  /// Map `deletedAt` as a nullable timestamp on a soft-deletable type's
  /// descriptor. Unresolved descriptors, other types, and descriptors that
  /// already have the field are left alone.
  pub fn on_metadata_built(&self, metadata: &mut EntityMetadata) -> Result<()> {
    let Some(reflection) = metadata.reflection() else {
      tracing::debug!(
        entity = metadata.entity_name(),
        "metadata not resolved yet, skipping"
      );
      return Ok(());
    };
    if !self.is_soft_deletable(reflection.type_id) || metadata.has_field(DELETED_AT) {
      return Ok(());
    }

    metadata.map_field(
      FieldMapping::new(DELETED_AT, FieldType::Timestamp)
        .nullable()
        .column(DELETED_AT_COLUMN),
    )?;
    tracing::debug!(entity = metadata.entity_name(), "mapped deletedAt");
    Ok(())
  }

  /// Turn every scheduled deletion of a soft-deletable entity into an update
  /// of `deletedAt`. Other scheduled deletions are untouched.
  pub fn on_pre_commit(&self, unit_of_work: &mut UnitOfWork) -> Result<()> {
    let scheduled = unit_of_work.scheduled_deletions().to_vec();

    for key in scheduled {
      let Some(cast) = unit_of_work.metadata(&key).and_then(|m| self.cast_for(m)) else {
        continue;
      };
      let Some(entity) = unit_of_work.entity_mut(&key) else {
        continue;
      };
      let Some(soft) = cast(entity.as_any_mut()) else {
        continue;
      };

      let old = Value::from(soft.deleted_at());
      soft.delete();
      let new = Value::from(soft.deleted_at());

      unit_of_work.persist_key(&key)?;
      // Edits made before `remove` were skipped by dirty-checking.
      unit_of_work.recompute_change_set(&key)?;
      unit_of_work.property_changed(&key, DELETED_AT, old.clone(), new.clone())?;
      unit_of_work.schedule_extra_update(&key, ChangeSet::single(DELETED_AT, old, new))?;

      tracing::debug!(entity = %key, "delete converted to soft delete");
    }
    Ok(())
  }
}

impl Listener for SoftDeleteInterceptor {
  fn name(&self) -> &'static str { "soft_delete" }

  fn subscribed_events(&self) -> &[Event] { &[Event::LoadClassMetadata, Event::OnFlush] }

  fn load_class_metadata(&self, args: &mut LoadClassMetadataArgs<'_>) -> Result<()> {
    self.on_metadata_built(args.metadata_mut())
  }

  fn on_flush(&self, args: &mut FlushArgs<'_>) -> Result<()> {
    self.on_pre_commit(args.unit_of_work_mut())
  }
}
