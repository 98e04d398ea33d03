//! The unit of work: identity map, scheduled operations and change sets.
//!
//! Entities enter the unit of work either as new (`persist`) or as loaded
//! from storage (`register_managed`). Managed entities are dirty-checked
//! against a snapshot of their original values. `commit` turns the pending
//! schedules into a [`FlushPlan`] and resets the unit for the next flush.

use std::{collections::BTreeMap, mem, sync::Arc};

use serde::Serialize;

use crate::{
  Error, Result,
  entity::{Entity, EntityKey, snapshot},
  metadata::{EntityMetadata, FieldMapping},
  plan::{FlushPlan, Statement},
  value::{Row, Value},
};

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
  /// Persisted in this unit, not yet written.
  New,
  /// Loaded or written; tracked for changes.
  Managed,
  /// Scheduled for physical deletion.
  Removed,
}

// ─── Change sets ─────────────────────────────────────────────────────────────

/// Field name -> `(old, new)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
  changes: BTreeMap<String, (Value, Value)>,
}

impl ChangeSet {
  pub fn new() -> Self { Self::default() }

  pub fn single(field: impl Into<String>, old: Value, new: Value) -> Self {
    let mut set = Self::new();
    set.record(field, old, new);
    set
  }

  /// Record a change, replacing any earlier record for the same field.
  pub fn record(&mut self, field: impl Into<String>, old: Value, new: Value) {
    self.changes.insert(field.into(), (old, new));
  }

  pub fn get(&self, field: &str) -> Option<&(Value, Value)> { self.changes.get(field) }

  pub fn contains(&self, field: &str) -> bool { self.changes.contains_key(field) }

  pub fn fields(&self) -> impl Iterator<Item = &str> { self.changes.keys().map(String::as_str) }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &(Value, Value))> {
    self.changes.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize { self.changes.len() }

  pub fn is_empty(&self) -> bool { self.changes.is_empty() }

  pub fn merge(&mut self, other: ChangeSet) { self.changes.extend(other.changes); }
}

// ─── Tracked entity ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct Tracked {
  metadata: Arc<EntityMetadata>,
  entity:   Box<dyn Entity>,
  state:    EntityState,
  /// Field values as last loaded or written; empty for new entities.
  original: Row,
}

// ─── Unit of work ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct UnitOfWork {
  identity_map:  BTreeMap<EntityKey, Tracked>,
  insertions:    Vec<EntityKey>,
  updates:       Vec<EntityKey>,
  deletions:     Vec<EntityKey>,
  change_sets:   BTreeMap<EntityKey, ChangeSet>,
  extra_updates: Vec<(EntityKey, ChangeSet)>,
}

impl UnitOfWork {
  pub fn new() -> Self { Self::default() }

  fn tracked(&self, key: &EntityKey) -> Result<&Tracked> {
    self
      .identity_map
      .get(key)
      .ok_or_else(|| Error::NotManaged(key.clone()))
  }

  fn tracked_mut(&mut self, key: &EntityKey) -> Result<&mut Tracked> {
    self
      .identity_map
      .get_mut(key)
      .ok_or_else(|| Error::NotManaged(key.clone()))
  }

  // ── Entering and leaving ──────────────────────────────────────────────────

  /// Track a new entity and schedule it for insertion.
  pub fn persist(
    &mut self,
    metadata: Arc<EntityMetadata>,
    entity: Box<dyn Entity>,
  ) -> Result<EntityKey> {
    let key = EntityKey::new(metadata.entity_name(), entity.id());
    if self.identity_map.contains_key(&key) {
      return Err(Error::AlreadyManaged(key));
    }
    self.identity_map.insert(key.clone(), Tracked {
      metadata,
      entity,
      state: EntityState::New,
      original: Row::new(),
    });
    self.insertions.push(key.clone());
    Ok(key)
  }

  /// Persist an entity that is already tracked. A removed entity becomes
  /// managed again and leaves the deletion schedule; otherwise a no-op.
  pub fn persist_key(&mut self, key: &EntityKey) -> Result<()> {
    let tracked = self.tracked_mut(key)?;
    if tracked.state == EntityState::Removed {
      tracked.state = EntityState::Managed;
      self.deletions.retain(|k| k != key);
    }
    Ok(())
  }

  /// Track an entity loaded from storage, snapshotting its current values.
  pub fn register_managed(
    &mut self,
    metadata: Arc<EntityMetadata>,
    entity: Box<dyn Entity>,
  ) -> Result<EntityKey> {
    let key = EntityKey::new(metadata.entity_name(), entity.id());
    if self.identity_map.contains_key(&key) {
      return Err(Error::AlreadyManaged(key));
    }
    let original = snapshot(&*entity, &metadata);
    self.identity_map.insert(key.clone(), Tracked {
      metadata,
      entity,
      state: EntityState::Managed,
      original,
    });
    Ok(key)
  }

  /// Schedule an entity for deletion. A new entity is simply forgotten.
  pub fn remove(&mut self, key: &EntityKey) -> Result<()> {
    let state = self.tracked(key)?.state;
    match state {
      EntityState::New => {
        self.detach(key);
      }
      EntityState::Managed => {
        self.tracked_mut(key)?.state = EntityState::Removed;
        self.updates.retain(|k| k != key);
        if !self.deletions.contains(key) {
          self.deletions.push(key.clone());
        }
      }
      EntityState::Removed => {}
    }
    Ok(())
  }

  /// Stop tracking an entity and drop it from every schedule.
  pub fn detach(&mut self, key: &EntityKey) -> Option<Box<dyn Entity>> {
    self.insertions.retain(|k| k != key);
    self.updates.retain(|k| k != key);
    self.deletions.retain(|k| k != key);
    self.change_sets.remove(key);
    self.extra_updates.retain(|(k, _)| k != key);
    self.identity_map.remove(key).map(|t| t.entity)
  }

  pub fn clear(&mut self) { *self = Self::default(); }

  // ── Change tracking ───────────────────────────────────────────────────────

  /// Dirty-check every managed entity against its snapshot and schedule the
  /// changed ones for update.
  pub fn compute_change_sets(&mut self) {
    let managed: Vec<EntityKey> = self
      .identity_map
      .iter()
      .filter(|(_, t)| t.state == EntityState::Managed)
      .map(|(k, _)| k.clone())
      .collect();
    for key in managed {
      self.schedule_dirty(&key);
    }
  }

  /// Dirty-check one tracked entity, e.g. after a listener made a removed
  /// entity managed again during `OnFlush`. Only managed entities are
  /// checked.
  pub fn recompute_change_set(&mut self, key: &EntityKey) -> Result<()> {
    if self.tracked(key)?.state == EntityState::Managed {
      self.schedule_dirty(key);
    }
    Ok(())
  }

  fn schedule_dirty(&mut self, key: &EntityKey) {
    let Some(tracked) = self.identity_map.get(key) else {
      return;
    };
    let changes = diff(tracked);
    if changes.is_empty() {
      return;
    }

    self.change_sets.entry(key.clone()).or_default().merge(changes);
    if !self.updates.contains(key) {
      self.updates.push(key.clone());
    }
  }

  /// Record that `field` of a tracked entity changed from `old` to `new`.
  /// A managed entity is scheduled for update.
  pub fn property_changed(
    &mut self,
    key: &EntityKey,
    field: &str,
    old: Value,
    new: Value,
  ) -> Result<()> {
    let tracked = self.tracked(key)?;
    if !tracked.metadata.has_field(field) {
      return Err(Error::UnknownField {
        entity: key.entity.clone(),
        field:  field.to_owned(),
      });
    }
    let state = tracked.state;

    self
      .change_sets
      .entry(key.clone())
      .or_default()
      .record(field, old, new);
    if state == EntityState::Managed && !self.updates.contains(key) {
      self.updates.push(key.clone());
    }
    Ok(())
  }

  /// Force an update of the given fields, independent of dirty-checking.
  pub fn schedule_extra_update(&mut self, key: &EntityKey, changes: ChangeSet) -> Result<()> {
    self.tracked(key)?;
    match self.extra_updates.iter_mut().find(|(k, _)| k == key) {
      Some((_, existing)) => existing.merge(changes),
      None => self.extra_updates.push((key.clone(), changes)),
    }
    Ok(())
  }

  // ── Inspection ────────────────────────────────────────────────────────────

  pub fn scheduled_insertions(&self) -> &[EntityKey] { &self.insertions }

  pub fn scheduled_updates(&self) -> &[EntityKey] { &self.updates }

  pub fn scheduled_deletions(&self) -> &[EntityKey] { &self.deletions }

  pub fn extra_updates(&self) -> &[(EntityKey, ChangeSet)] { &self.extra_updates }

  pub fn extra_update(&self, key: &EntityKey) -> Option<&ChangeSet> {
    self
      .extra_updates
      .iter()
      .find_map(|(k, changes)| (k == key).then_some(changes))
  }

  pub fn is_scheduled_for_insert(&self, key: &EntityKey) -> bool {
    self.insertions.contains(key)
  }

  pub fn is_scheduled_for_update(&self, key: &EntityKey) -> bool {
    self.updates.contains(key)
  }

  pub fn is_scheduled_for_delete(&self, key: &EntityKey) -> bool {
    self.deletions.contains(key)
  }

  pub fn has_pending_changes(&self) -> bool {
    !(self.insertions.is_empty()
      && self.updates.is_empty()
      && self.deletions.is_empty()
      && self.extra_updates.is_empty())
  }

  pub fn contains(&self, key: &EntityKey) -> bool { self.identity_map.contains_key(key) }

  pub fn keys(&self) -> impl Iterator<Item = &EntityKey> { self.identity_map.keys() }

  pub fn len(&self) -> usize { self.identity_map.len() }

  pub fn is_empty(&self) -> bool { self.identity_map.is_empty() }

  pub fn entity(&self, key: &EntityKey) -> Option<&dyn Entity> {
    self.identity_map.get(key).map(|t| &*t.entity)
  }

  pub fn entity_mut(&mut self, key: &EntityKey) -> Option<&mut dyn Entity> {
    self.identity_map.get_mut(key).map(|t| &mut *t.entity)
  }

  pub fn metadata(&self, key: &EntityKey) -> Option<&Arc<EntityMetadata>> {
    self.identity_map.get(key).map(|t| &t.metadata)
  }

  pub fn entity_state(&self, key: &EntityKey) -> Option<EntityState> {
    self.identity_map.get(key).map(|t| t.state)
  }

  pub fn change_set(&self, key: &EntityKey) -> Option<&ChangeSet> { self.change_sets.get(key) }

  pub fn original_data(&self, key: &EntityKey) -> Option<&Row> {
    self.identity_map.get(key).map(|t| &t.original)
  }

  // ── Commit ────────────────────────────────────────────────────────────────

  /// Plan every scheduled operation, then reset the schedules: written
  /// entities become managed with a fresh snapshot and deleted ones are
  /// detached. Nothing is reset if planning fails.
  pub fn commit(&mut self) -> Result<FlushPlan> {
    let mut plan = FlushPlan::default();

    for key in &self.insertions {
      let tracked = self.tracked(key)?;
      let metadata = &tracked.metadata;
      let values = metadata
        .fields()
        .iter()
        .map(|mapping| {
          let value = tracked.entity.get(&mapping.field_name).unwrap_or(Value::Null);
          check_value(mapping, &value)?;
          Ok((mapping.column_name.clone(), value))
        })
        .collect::<Result<Vec<_>>>()?;
      plan.statements.push(Statement::Insert {
        table: metadata.table_name().to_owned(),
        values,
      });
    }

    for key in &self.updates {
      let Some(changes) = self.change_sets.get(key).filter(|c| !c.is_empty()) else {
        continue;
      };
      plan
        .statements
        .push(update_statement(key, &self.tracked(key)?.metadata, changes)?);
    }

    for (key, changes) in &self.extra_updates {
      if changes.is_empty() {
        continue;
      }
      plan
        .statements
        .push(update_statement(key, &self.tracked(key)?.metadata, changes)?);
    }

    for key in &self.deletions {
      let metadata = &self.tracked(key)?.metadata;
      plan.statements.push(Statement::Delete {
        table:      metadata.table_name().to_owned(),
        key_column: metadata.identifier().column_name.clone(),
        id:         key.id,
      });
    }

    let written: Vec<EntityKey> = mem::take(&mut self.insertions)
      .into_iter()
      .chain(mem::take(&mut self.updates))
      .chain(mem::take(&mut self.extra_updates).into_iter().map(|(k, _)| k))
      .collect();
    for key in &written {
      if let Some(tracked) = self.identity_map.get_mut(key) {
        tracked.state = EntityState::Managed;
        tracked.original = snapshot(&*tracked.entity, &tracked.metadata);
      }
    }
    for key in mem::take(&mut self.deletions) {
      self.identity_map.remove(&key);
    }
    self.change_sets.clear();

    tracing::debug!(
      statements = plan.len(),
      tracked = self.identity_map.len(),
      "unit of work committed"
    );
    Ok(plan)
  }
}

/// Fields whose current value differs from the original snapshot.
fn diff(tracked: &Tracked) -> ChangeSet {
  let mut changes = ChangeSet::new();
  for (field, new) in snapshot(&*tracked.entity, &tracked.metadata) {
    let old = tracked.original.get(&field).cloned().unwrap_or(Value::Null);
    if old != new {
      changes.record(field, old, new);
    }
  }
  changes
}

fn check_value(mapping: &FieldMapping, value: &Value) -> Result<()> {
  if value.is_null() && !mapping.nullable {
    return Err(Error::UnexpectedNull(mapping.field_name.clone()));
  }
  if !value.matches(mapping.field_type) {
    return Err(Error::TypeMismatch {
      field:    mapping.field_name.clone(),
      expected: mapping.field_type,
      found:    value.type_name(),
    });
  }
  Ok(())
}

fn update_statement(
  key: &EntityKey,
  metadata: &EntityMetadata,
  changes: &ChangeSet,
) -> Result<Statement> {
  let values = changes
    .iter()
    .map(|(field, (_, new))| {
      let mapping = metadata.field(field).ok_or_else(|| Error::UnknownField {
        entity: key.entity.clone(),
        field:  field.to_owned(),
      })?;
      check_value(mapping, new)?;
      Ok((mapping.column_name.clone(), new.clone()))
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(Statement::Update {
    table: metadata.table_name().to_owned(),
    key_column: metadata.identifier().column_name.clone(),
    id: key.id,
    values,
  })
}
