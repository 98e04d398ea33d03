//! [`EntityManager`]: the entry point applications use.
//!
//! Owns the listener registry, the metadata factory and one unit of work.
//! Listeners should be registered before the first entity type is used:
//! metadata is built once per type and `LoadClassMetadata` listeners added
//! later never see types that are already loaded.

use std::sync::Arc;

use crate::{
  Error, Result,
  entity::{Entity, EntityKey},
  event::{EventManager, FlushArgs, Listener, PostFlushArgs},
  metadata::{EntityMetadata, MetadataFactory},
  plan::FlushPlan,
  unit_of_work::UnitOfWork,
  value::Row,
};

#[derive(Debug, Default)]
pub struct EntityManager {
  events:       EventManager,
  metadata:     MetadataFactory,
  unit_of_work: UnitOfWork,
}

impl EntityManager {
  pub fn new(events: EventManager) -> Self {
    Self { events, ..Self::default() }
  }

  pub fn add_listener(&mut self, listener: Arc<dyn Listener>) {
    self.events.add_listener(listener);
  }

  pub fn events(&self) -> &EventManager { &self.events }

  pub fn metadata_factory(&self) -> &MetadataFactory { &self.metadata }

  pub fn unit_of_work(&self) -> &UnitOfWork { &self.unit_of_work }

  pub fn unit_of_work_mut(&mut self) -> &mut UnitOfWork { &mut self.unit_of_work }

  pub fn metadata_for<T: Entity>(&mut self) -> Result<Arc<EntityMetadata>> {
    self.metadata.metadata_for::<T>(&self.events)
  }

  pub fn key_for<T: Entity>(&mut self, id: i64) -> Result<EntityKey> {
    let metadata = self.metadata_for::<T>()?;
    Ok(EntityKey::new(metadata.entity_name(), id))
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Schedule a new entity for insertion.
  pub fn persist<T: Entity>(&mut self, entity: T) -> Result<EntityKey> {
    let metadata = self.metadata_for::<T>()?;
    self.unit_of_work.persist(metadata, Box::new(entity))
  }

  /// Hydrate a stored row into a managed entity.
  pub fn load<T: Entity>(&mut self, row: &Row) -> Result<EntityKey> {
    let metadata = self.metadata_for::<T>()?;
    let entity = T::hydrate(row)?;
    self.unit_of_work.register_managed(metadata, Box::new(entity))
  }

  pub fn remove(&mut self, key: &EntityKey) -> Result<()> { self.unit_of_work.remove(key) }

  pub fn detach(&mut self, key: &EntityKey) -> Option<Box<dyn Entity>> {
    self.unit_of_work.detach(key)
  }

  pub fn clear(&mut self) { self.unit_of_work.clear(); }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// A tracked entity of type `T`, if the unit of work holds one with `id`.
  pub fn find<T: Entity>(&mut self, id: i64) -> Result<Option<&T>> {
    let key = self.key_for::<T>(id)?;
    Ok(
      self
        .unit_of_work
        .entity(&key)
        .and_then(|e| e.as_any().downcast_ref::<T>()),
    )
  }

  pub fn find_mut<T: Entity>(&mut self, id: i64) -> Result<Option<&mut T>> {
    let key = self.key_for::<T>(id)?;
    Ok(
      self
        .unit_of_work
        .entity_mut(&key)
        .and_then(|e| e.as_any_mut().downcast_mut::<T>()),
    )
  }

  /// Like [`EntityManager::find_mut`], but a missing entity is an error.
  pub fn get_mut<T: Entity>(&mut self, id: i64) -> Result<&mut T> {
    let key = self.key_for::<T>(id)?;
    self
      .unit_of_work
      .entity_mut(&key)
      .and_then(|e| e.as_any_mut().downcast_mut::<T>())
      .ok_or(Error::NotManaged(key))
  }

  // ── Flush ─────────────────────────────────────────────────────────────────

  /// Compute pending changes, run the flush listeners, and plan the
  /// statements that write them.
  ///
  /// Order: `PreFlush`, dirty-checking, `OnFlush`, planning, `PostFlush`.
  /// `OnFlush` listeners may still reschedule entities; nothing is planned
  /// until they have all returned.
  pub fn flush(&mut self) -> Result<FlushPlan> {
    self
      .events
      .dispatch_pre_flush(&mut FlushArgs::new(&mut self.unit_of_work))?;

    self.unit_of_work.compute_change_sets();

    self
      .events
      .dispatch_on_flush(&mut FlushArgs::new(&mut self.unit_of_work))?;

    let plan = self.unit_of_work.commit()?;
    tracing::info!(
      inserts = plan.inserts().count(),
      updates = plan.updates().count(),
      deletes = plan.deletes().count(),
      "flush planned"
    );

    self.events.dispatch_post_flush(&PostFlushArgs::new(&plan))?;
    Ok(plan)
  }
}
