//! Mapping metadata: how an entity type maps to a table.
//!
//! [`EntityMetadata`] is built once per type by the [`MetadataFactory`]. While
//! it is being built, `LoadClassMetadata` listeners receive it mutably and
//! may map extra fields; after that it is shared read-only behind an `Arc`.

use std::{
  any::{TypeId, type_name},
  collections::HashMap,
  sync::Arc,
};

use serde::Serialize;

use crate::{
  Error, Result,
  entity::Entity,
  event::{EventManager, LoadClassMetadataArgs},
  value::FieldType,
};

// ─── Field mapping ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
  pub field_name:  String,
  pub column_name: String,
  pub field_type:  FieldType,
  pub nullable:    bool,
}

impl FieldMapping {
  /// A non-nullable mapping whose column is the snake_case field name.
  pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
    let field_name = field_name.into();
    Self {
      column_name: column_name_for(&field_name),
      field_name,
      field_type,
      nullable: false,
    }
  }

  pub fn nullable(mut self) -> Self {
    self.nullable = true;
    self
  }

  pub fn column(mut self, column_name: impl Into<String>) -> Self {
    self.column_name = column_name.into();
    self
  }
}

/// `deletedAt` -> `deleted_at`.
pub fn column_name_for(field_name: &str) -> String {
  let mut out = String::with_capacity(field_name.len() + 4);
  for (i, ch) in field_name.chars().enumerate() {
    if ch.is_ascii_uppercase() {
      if i > 0 {
        out.push('_');
      }
      out.push(ch.to_ascii_lowercase());
    } else {
      out.push(ch);
    }
  }
  out
}

// ─── Reflection ──────────────────────────────────────────────────────────────

/// The Rust type a descriptor was built for. Present once the descriptor is
/// fully resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeReflection {
  pub type_id:   TypeId,
  pub type_name: &'static str,
}

impl TypeReflection {
  pub fn of<T: 'static>() -> Self {
    Self { type_id: TypeId::of::<T>(), type_name: type_name::<T>() }
  }
}

// ─── Metadata ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct EntityMetadata {
  entity_name: String,
  table_name:  String,
  identifier:  String,
  fields:      Vec<FieldMapping>,
  #[serde(skip)]
  reflection:  Option<TypeReflection>,
}

impl EntityMetadata {
  /// An unresolved descriptor with an integer `id` identifier field.
  pub fn new(entity_name: impl Into<String>, table_name: impl Into<String>) -> Self {
    Self {
      entity_name: entity_name.into(),
      table_name:  table_name.into(),
      identifier:  "id".to_owned(),
      fields:      vec![FieldMapping::new("id", FieldType::Integer)],
      reflection:  None,
    }
  }

  /// Add a field mapping, replacing any existing mapping with the same name.
  pub fn with_field(mut self, mapping: FieldMapping) -> Self {
    match self.fields.iter_mut().find(|f| f.field_name == mapping.field_name) {
      Some(existing) => *existing = mapping,
      None => self.fields.push(mapping),
    }
    self
  }

  pub fn entity_name(&self) -> &str { &self.entity_name }

  pub fn table_name(&self) -> &str { &self.table_name }

  /// The identifier's field mapping.
  pub fn identifier(&self) -> &FieldMapping {
    // `new` always maps the identifier and nothing removes mappings.
    self
      .field(&self.identifier)
      .unwrap_or(&self.fields[0])
  }

  pub fn fields(&self) -> &[FieldMapping] { &self.fields }

  pub fn field(&self, field_name: &str) -> Option<&FieldMapping> {
    self.fields.iter().find(|f| f.field_name == field_name)
  }

  pub fn has_field(&self, field_name: &str) -> bool {
    self.field(field_name).is_some()
  }

  /// Map a new field. Mapping a name twice is an error.
  pub fn map_field(&mut self, mapping: FieldMapping) -> Result<()> {
    if self.has_field(&mapping.field_name) {
      return Err(Error::DuplicateField {
        entity: self.entity_name.clone(),
        field:  mapping.field_name,
      });
    }
    self.fields.push(mapping);
    Ok(())
  }

  pub fn reflection(&self) -> Option<&TypeReflection> { self.reflection.as_ref() }

  pub fn is_resolved(&self) -> bool { self.reflection.is_some() }

  pub fn resolve(&mut self, reflection: TypeReflection) {
    self.reflection = Some(reflection);
  }

  pub fn is_type<T: 'static>(&self) -> bool {
    self.reflection.is_some_and(|r| r.type_id == TypeId::of::<T>())
  }
}

// ─── Factory ─────────────────────────────────────────────────────────────────

/// Builds and caches one [`EntityMetadata`] per entity type.
#[derive(Debug, Default)]
pub struct MetadataFactory {
  loaded: HashMap<TypeId, Arc<EntityMetadata>>,
}

impl MetadataFactory {
  pub fn new() -> Self { Self::default() }

  /// Return the metadata for `T`, building it on first use.
  ///
  /// Building calls [`Entity::describe`], resolves the descriptor, and then
  /// hands it to every `LoadClassMetadata` listener in registration order.
  pub fn metadata_for<T: Entity>(
    &mut self,
    events: &EventManager,
  ) -> Result<Arc<EntityMetadata>> {
    let type_id = TypeId::of::<T>();
    if let Some(metadata) = self.loaded.get(&type_id) {
      return Ok(Arc::clone(metadata));
    }

    let mut metadata = T::describe();
    metadata.resolve(TypeReflection::of::<T>());
    events.dispatch_load_class_metadata(&mut LoadClassMetadataArgs::new(
      &mut metadata,
    ))?;

    tracing::debug!(
      entity = metadata.entity_name(),
      table = metadata.table_name(),
      fields = metadata.fields().len(),
      "loaded entity metadata"
    );

    let metadata = Arc::new(metadata);
    self.loaded.insert(type_id, Arc::clone(&metadata));
    Ok(metadata)
  }

  pub fn get(&self, type_id: TypeId) -> Option<Arc<EntityMetadata>> {
    self.loaded.get(&type_id).cloned()
  }

  pub fn by_name(&self, entity_name: &str) -> Option<Arc<EntityMetadata>> {
    self
      .loaded
      .values()
      .find(|m| m.entity_name() == entity_name)
      .cloned()
  }

  pub fn loaded(&self) -> impl Iterator<Item = &Arc<EntityMetadata>> {
    self.loaded.values()
  }
}
