//! Lifecycle events and the listener registry.
//!
//! Listeners are registered explicitly with an [`EventManager`]; each one
//! declares the events it handles and is called for them in registration
//! order. Errors returned by a listener abort the operation that dispatched
//! the event and reach the caller unchanged.

use std::{collections::HashMap, fmt, sync::Arc};

use strum::{AsRefStr, Display, EnumIter};

use crate::{
  Result,
  metadata::EntityMetadata,
  plan::FlushPlan,
  unit_of_work::UnitOfWork,
};

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum Event {
  /// A type's metadata has been described and resolved but not yet cached.
  LoadClassMetadata,
  /// A flush is starting; change sets have not been computed.
  PreFlush,
  /// Change sets and schedules are computed; no statements planned yet.
  OnFlush,
  /// The flush plan is complete.
  PostFlush,
}

// ─── Event arguments ─────────────────────────────────────────────────────────

pub struct LoadClassMetadataArgs<'a> {
  metadata: &'a mut EntityMetadata,
}

impl<'a> LoadClassMetadataArgs<'a> {
  pub fn new(metadata: &'a mut EntityMetadata) -> Self { Self { metadata } }

  pub fn metadata(&self) -> &EntityMetadata { self.metadata }

  pub fn metadata_mut(&mut self) -> &mut EntityMetadata { self.metadata }
}

/// Arguments for `PreFlush` and `OnFlush`.
pub struct FlushArgs<'a> {
  unit_of_work: &'a mut UnitOfWork,
}

impl<'a> FlushArgs<'a> {
  pub fn new(unit_of_work: &'a mut UnitOfWork) -> Self { Self { unit_of_work } }

  pub fn unit_of_work(&self) -> &UnitOfWork { self.unit_of_work }

  pub fn unit_of_work_mut(&mut self) -> &mut UnitOfWork { self.unit_of_work }
}

pub struct PostFlushArgs<'a> {
  plan: &'a FlushPlan,
}

impl<'a> PostFlushArgs<'a> {
  pub fn new(plan: &'a FlushPlan) -> Self { Self { plan } }

  pub fn plan(&self) -> &FlushPlan { self.plan }
}

// ─── Listener ────────────────────────────────────────────────────────────────

/// A lifecycle listener. Handlers default to no-ops, so an implementation
/// only overrides the ones it lists in [`Listener::subscribed_events`].
pub trait Listener: Send + Sync {
  /// Name for logging.
  fn name(&self) -> &'static str;

  fn subscribed_events(&self) -> &[Event];

  fn load_class_metadata(&self, _args: &mut LoadClassMetadataArgs<'_>) -> Result<()> {
    Ok(())
  }

  fn pre_flush(&self, _args: &mut FlushArgs<'_>) -> Result<()> { Ok(()) }

  fn on_flush(&self, _args: &mut FlushArgs<'_>) -> Result<()> { Ok(()) }

  fn post_flush(&self, _args: &PostFlushArgs<'_>) -> Result<()> { Ok(()) }
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[derive(Default, Clone)]
pub struct EventManager {
  listeners: HashMap<Event, Vec<Arc<dyn Listener>>>,
}

impl fmt::Debug for EventManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut map = f.debug_map();
    for (event, listeners) in &self.listeners {
      let names: Vec<_> = listeners.iter().map(|l| l.name()).collect();
      map.entry(event, &names);
    }
    map.finish()
  }
}

impl EventManager {
  pub fn new() -> Self { Self::default() }

  /// Register `listener` for every event it subscribes to, after any
  /// listeners already registered for that event.
  pub fn add_listener(&mut self, listener: Arc<dyn Listener>) {
    for &event in listener.subscribed_events() {
      self
        .listeners
        .entry(event)
        .or_default()
        .push(Arc::clone(&listener));
      tracing::debug!(listener = listener.name(), %event, "registered listener");
    }
  }

  /// Remove every registration of the listener called `name`.
  pub fn remove_listener(&mut self, name: &str) {
    for listeners in self.listeners.values_mut() {
      listeners.retain(|l| l.name() != name);
    }
    self.listeners.retain(|_, listeners| !listeners.is_empty());
  }

  pub fn listeners(&self, event: Event) -> &[Arc<dyn Listener>] {
    self.listeners.get(&event).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn has_listeners(&self, event: Event) -> bool {
    !self.listeners(event).is_empty()
  }

  pub fn dispatch_load_class_metadata(
    &self,
    args: &mut LoadClassMetadataArgs<'_>,
  ) -> Result<()> {
    for listener in self.listeners(Event::LoadClassMetadata) {
      listener.load_class_metadata(args)?;
    }
    Ok(())
  }

  pub fn dispatch_pre_flush(&self, args: &mut FlushArgs<'_>) -> Result<()> {
    for listener in self.listeners(Event::PreFlush) {
      listener.pre_flush(args)?;
    }
    Ok(())
  }

  pub fn dispatch_on_flush(&self, args: &mut FlushArgs<'_>) -> Result<()> {
    for listener in self.listeners(Event::OnFlush) {
      listener.on_flush(args)?;
    }
    Ok(())
  }

  pub fn dispatch_post_flush(&self, args: &PostFlushArgs<'_>) -> Result<()> {
    for listener in self.listeners(Event::PostFlush) {
      listener.post_flush(args)?;
    }
    Ok(())
  }
}
