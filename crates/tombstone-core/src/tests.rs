//! Unit-of-work and entity-manager behavior against a small fixture entity.

use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::{
  EntityManager, Error, Result,
  entity::{Entity, EntityKey},
  event::{Event, FlushArgs, LoadClassMetadataArgs, Listener, PostFlushArgs},
  metadata::{EntityMetadata, FieldMapping},
  plan::Statement,
  unit_of_work::{ChangeSet, EntityState},
  value::{FieldType, Row, Timestamp, Value, read},
};

// ─── Fixture ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Note {
  id:          i64,
  body:        String,
  archived_at: Option<Timestamp>,
}

impl Note {
  fn new(id: i64, body: &str) -> Self {
    Self { id, body: body.into(), archived_at: None }
  }
}

impl Entity for Note {
  fn describe() -> EntityMetadata {
    EntityMetadata::new("Note", "notes")
      .with_field(FieldMapping::new("body", FieldType::Text))
  }

  fn hydrate(row: &Row) -> Result<Self> {
    Ok(Self {
      id:          read(row, "id")?,
      body:        read(row, "body")?,
      archived_at: read(row, "archivedAt")?,
    })
  }

  fn id(&self) -> i64 { self.id }

  fn get(&self, field: &str) -> Option<Value> {
    match field {
      "id" => Some(self.id.into()),
      "body" => Some(self.body.as_str().into()),
      "archivedAt" => Some(self.archived_at.into()),
      _ => None,
    }
  }

  fn set(&mut self, field: &str, value: Value) -> Result<()> {
    match field {
      "body" => self.body = crate::value::FromValue::from_value(field, &value)?,
      "archivedAt" => self.archived_at = crate::value::FromValue::from_value(field, &value)?,
      other => {
        return Err(Error::UnknownField { entity: "Note".into(), field: other.into() });
      }
    }
    Ok(())
  }
}

fn note_row(id: i64, body: &str) -> Row {
  let mut row = Row::new();
  row.insert("id".into(), id.into());
  row.insert("body".into(), body.into());
  row
}

/// Maps `archivedAt` on every resolved descriptor and records every event.
struct Archiving {
  seen: Arc<Mutex<Vec<String>>>,
}

impl Listener for Archiving {
  fn name(&self) -> &'static str { "archiving" }

  fn subscribed_events(&self) -> &[Event] {
    &[Event::LoadClassMetadata, Event::PreFlush, Event::OnFlush, Event::PostFlush]
  }

  fn load_class_metadata(&self, args: &mut LoadClassMetadataArgs<'_>) -> Result<()> {
    self.seen.lock().unwrap().push("loadClassMetadata".into());
    args
      .metadata_mut()
      .map_field(FieldMapping::new("archivedAt", FieldType::Timestamp).nullable())
  }

  fn pre_flush(&self, _args: &mut FlushArgs<'_>) -> Result<()> {
    self.seen.lock().unwrap().push("preFlush".into());
    Ok(())
  }

  fn on_flush(&self, args: &mut FlushArgs<'_>) -> Result<()> {
    let pending = args.unit_of_work().scheduled_insertions().len();
    self.seen.lock().unwrap().push(format!("onFlush:{pending}"));
    Ok(())
  }

  fn post_flush(&self, args: &PostFlushArgs<'_>) -> Result<()> {
    self
      .seen
      .lock()
      .unwrap()
      .push(format!("postFlush:{}", args.plan().len()));
    Ok(())
  }
}

fn manager() -> EntityManager { EntityManager::default() }

fn key(id: i64) -> EntityKey { EntityKey::new("Note", id) }

// ─── Metadata ────────────────────────────────────────────────────────────────

#[test]
fn metadata_is_resolved_and_cached() {
  let mut em = manager();
  let first = em.metadata_for::<Note>().unwrap();
  let second = em.metadata_for::<Note>().unwrap();
  assert!(first.is_resolved());
  assert!(first.is_type::<Note>());
  assert!(Arc::ptr_eq(&first, &second));
  assert!(em.metadata_factory().by_name("Note").is_some());
}

#[test]
fn metadata_listener_runs_once_per_type() {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let mut em = manager();
  em.add_listener(Arc::new(Archiving { seen: Arc::clone(&seen) }));

  em.metadata_for::<Note>().unwrap();
  let metadata = em.metadata_for::<Note>().unwrap();

  let archived = metadata.field("archivedAt").unwrap();
  assert_eq!(archived.column_name, "archived_at");
  assert!(archived.nullable);
  assert_eq!(
    seen.lock().unwrap().iter().filter(|e| *e == "loadClassMetadata").count(),
    1
  );
}

// ─── Inserts ─────────────────────────────────────────────────────────────────

#[test]
fn persist_plans_insert_with_all_columns() {
  let mut em = manager();
  let key = em.persist(Note::new(1, "hello")).unwrap();
  assert_eq!(key, EntityKey::new("Note", 1));
  assert!(em.unit_of_work().is_scheduled_for_insert(&key));

  let plan = em.flush().unwrap();
  assert_eq!(plan.statements, vec![Statement::Insert {
    table:  "notes".into(),
    values: vec![("id".into(), Value::Integer(1)), ("body".into(), "hello".into())],
  }]);
  assert_eq!(em.unit_of_work().entity_state(&key), Some(EntityState::Managed));
}

#[test]
fn persisting_same_identity_twice_fails() {
  let mut em = manager();
  em.persist(Note::new(1, "a")).unwrap();
  let err = em.persist(Note::new(1, "b")).unwrap_err();
  assert!(matches!(err, Error::AlreadyManaged(k) if k == key(1)));
}

#[test]
fn flushed_entity_is_not_written_again() {
  let mut em = manager();
  em.persist(Note::new(1, "hello")).unwrap();
  em.flush().unwrap();
  assert!(em.flush().unwrap().is_empty());
}

// ─── Updates ─────────────────────────────────────────────────────────────────

#[test]
fn dirty_checking_updates_only_changed_columns() {
  let mut em = manager();
  em.load::<Note>(&note_row(3, "before")).unwrap();
  em.get_mut::<Note>(3).unwrap().body = "after".into();

  let plan = em.flush().unwrap();
  assert_eq!(plan.statements, vec![Statement::Update {
    table:      "notes".into(),
    key_column: "id".into(),
    id:         3,
    values:     vec![("body".into(), "after".into())],
  }]);
}

#[test]
fn unchanged_loaded_entity_produces_no_statements() {
  let mut em = manager();
  em.load::<Note>(&note_row(3, "same")).unwrap();
  assert!(em.flush().unwrap().is_empty());
}

#[test]
fn property_changed_schedules_update() {
  let seen = Arc::default();
  let mut em = manager();
  em.add_listener(Arc::new(Archiving { seen }));
  em.load::<Note>(&note_row(4, "x")).unwrap();

  let now = Utc::now();
  let uow = em.unit_of_work_mut();
  uow
    .property_changed(&key(4), "archivedAt", Value::Null, now.into())
    .unwrap();
  assert!(uow.is_scheduled_for_update(&key(4)));
  assert_eq!(
    uow.change_set(&key(4)).unwrap().get("archivedAt"),
    Some(&(Value::Null, Value::Timestamp(now)))
  );
}

#[test]
fn property_changed_rejects_unmapped_field() {
  let mut em = manager();
  em.load::<Note>(&note_row(4, "x")).unwrap();
  let err = em
    .unit_of_work_mut()
    .property_changed(&key(4), "nope", Value::Null, Value::Null)
    .unwrap_err();
  assert!(matches!(err, Error::UnknownField { field, .. } if field == "nope"));
}

#[test]
fn extra_update_is_planned_without_dirty_state() {
  let mut em = manager();
  em.load::<Note>(&note_row(5, "x")).unwrap();
  em.unit_of_work_mut()
    .schedule_extra_update(&key(5), ChangeSet::single("body", "x".into(), "y".into()))
    .unwrap();

  let plan = em.flush().unwrap();
  assert_eq!(plan.updates().count(), 1);
  assert!(em.unit_of_work().extra_updates().is_empty());
}

#[test]
fn extra_updates_for_same_entity_merge() {
  let mut em = manager();
  em.load::<Note>(&note_row(5, "x")).unwrap();
  let uow = em.unit_of_work_mut();
  uow
    .schedule_extra_update(&key(5), ChangeSet::single("body", "x".into(), "y".into()))
    .unwrap();
  uow
    .schedule_extra_update(&key(5), ChangeSet::single("id", 5.into(), 5.into()))
    .unwrap();
  assert_eq!(uow.extra_updates().len(), 1);
  assert_eq!(uow.extra_update(&key(5)).unwrap().len(), 2);
}

#[test]
fn schedule_extra_update_requires_tracked_entity() {
  let mut em = manager();
  let err = em
    .unit_of_work_mut()
    .schedule_extra_update(&key(9), ChangeSet::new())
    .unwrap_err();
  assert!(matches!(err, Error::NotManaged(_)));
}

// ─── Deletes ─────────────────────────────────────────────────────────────────

#[test]
fn remove_managed_plans_delete_and_detaches() {
  let mut em = manager();
  let key = em.load::<Note>(&note_row(7, "bye")).unwrap();
  em.remove(&key).unwrap();
  assert_eq!(em.unit_of_work().scheduled_deletions(), [key.clone()]);
  assert_eq!(em.unit_of_work().entity_state(&key), Some(EntityState::Removed));

  let plan = em.flush().unwrap();
  assert_eq!(plan.statements, vec![Statement::Delete {
    table:      "notes".into(),
    key_column: "id".into(),
    id:         7,
  }]);
  assert!(!em.unit_of_work().contains(&key));
}

#[test]
fn remove_new_entity_forgets_it() {
  let mut em = manager();
  let key = em.persist(Note::new(8, "draft")).unwrap();
  em.remove(&key).unwrap();
  assert!(!em.unit_of_work().contains(&key));
  assert!(em.flush().unwrap().is_empty());
}

#[test]
fn remove_drops_pending_update() {
  let mut em = manager();
  let key = em.load::<Note>(&note_row(7, "x")).unwrap();
  em.unit_of_work_mut()
    .property_changed(&key, "body", "x".into(), "y".into())
    .unwrap();
  em.remove(&key).unwrap();
  assert!(!em.unit_of_work().is_scheduled_for_update(&key));
}

#[test]
fn remove_untracked_fails() {
  let mut em = manager();
  assert!(matches!(em.remove(&key(1)), Err(Error::NotManaged(_))));
}

#[test]
fn persist_key_cancels_deletion() {
  let mut em = manager();
  let key = em.load::<Note>(&note_row(7, "keep")).unwrap();
  em.remove(&key).unwrap();
  em.unit_of_work_mut().persist_key(&key).unwrap();

  assert!(!em.unit_of_work().is_scheduled_for_delete(&key));
  assert_eq!(em.unit_of_work().entity_state(&key), Some(EntityState::Managed));
  assert!(em.flush().unwrap().is_empty());
}

#[test]
fn recompute_picks_up_edits_of_re_persisted_entity() {
  let mut em = manager();
  let key = em.load::<Note>(&note_row(7, "draft")).unwrap();
  em.get_mut::<Note>(7).unwrap().body = "final".into();
  em.remove(&key).unwrap();

  // Removed entities are not dirty-checked.
  em.unit_of_work_mut().recompute_change_set(&key).unwrap();
  assert!(em.unit_of_work().change_set(&key).is_none());

  em.unit_of_work_mut().persist_key(&key).unwrap();
  em.unit_of_work_mut().recompute_change_set(&key).unwrap();
  assert!(em.unit_of_work().is_scheduled_for_update(&key));
  assert_eq!(
    em.unit_of_work().change_set(&key).unwrap().get("body"),
    Some(&(Value::from("draft"), Value::from("final")))
  );
}

#[test]
fn recompute_requires_tracked_entity() {
  let mut em = manager();
  let err = em.unit_of_work_mut().recompute_change_set(&key(3)).unwrap_err();
  assert!(matches!(err, Error::NotManaged(_)));
}

// ─── Flush ───────────────────────────────────────────────────────────────────

#[test]
fn flush_events_fire_in_order() {
  let seen = Arc::new(Mutex::new(Vec::new()));
  let mut em = manager();
  em.add_listener(Arc::new(Archiving { seen: Arc::clone(&seen) }));
  em.persist(Note::new(1, "a")).unwrap();
  em.flush().unwrap();

  assert_eq!(*seen.lock().unwrap(), [
    "loadClassMetadata",
    "preFlush",
    "onFlush:1",
    "postFlush:1"
  ]);
}

#[test]
fn invalid_insert_keeps_schedules() {
  #[derive(Debug)]
  struct Broken;

  impl Entity for Broken {
    fn describe() -> EntityMetadata {
      EntityMetadata::new("Broken", "broken")
        .with_field(FieldMapping::new("name", FieldType::Text))
    }

    fn hydrate(_row: &Row) -> Result<Self> { Ok(Self) }

    fn id(&self) -> i64 { 1 }

    fn get(&self, field: &str) -> Option<Value> {
      (field == "id").then_some(Value::Integer(1))
    }

    fn set(&mut self, _field: &str, _value: Value) -> Result<()> { Ok(()) }
  }

  let mut em = manager();
  let key = em.persist(Broken).unwrap();
  let err = em.flush().unwrap_err();
  assert!(matches!(err, Error::UnexpectedNull(f) if f == "name"));
  assert!(em.unit_of_work().is_scheduled_for_insert(&key));
}

#[test]
fn find_downcasts_tracked_entity() {
  let mut em = manager();
  em.persist(Note::new(2, "typed")).unwrap();
  assert_eq!(em.find::<Note>(2).unwrap().unwrap().body, "typed");
  assert!(em.find::<Note>(3).unwrap().is_none());

  em.find_mut::<Note>(2)
    .unwrap()
    .unwrap()
    .set("body", "changed".into())
    .unwrap();
  assert_eq!(em.find::<Note>(2).unwrap().unwrap().body, "changed");
}
