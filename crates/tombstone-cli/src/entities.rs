//! The demo entity types the `tombstone` binary manages.
//!
//! `Article` opts into soft deletes; `Tag` does not and is removed outright.

use serde::Serialize;
use tombstone_core::{
  Entity, EntityMetadata, Error, FieldMapping, FieldType, Result, Row, Timestamp, Value,
  value::{FromValue, read},
};
use tombstone_soft_delete::{DELETED_AT, SoftDeletable};

// ─── Article ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Article {
  pub id:         i64,
  pub title:      String,
  pub deleted_at: Option<Timestamp>,
}

impl Article {
  pub fn new(id: i64, title: impl Into<String>) -> Self {
    Self { id, title: title.into(), deleted_at: None }
  }
}

impl Entity for Article {
  fn describe() -> EntityMetadata {
    EntityMetadata::new("Article", "articles")
      .with_field(FieldMapping::new("title", FieldType::Text))
  }

  fn hydrate(row: &Row) -> Result<Self> {
    Ok(Self {
      id:         read(row, "id")?,
      title:      read(row, "title")?,
      deleted_at: read(row, DELETED_AT)?,
    })
  }

  fn id(&self) -> i64 { self.id }

  fn get(&self, field: &str) -> Option<Value> {
    match field {
      "id" => Some(self.id.into()),
      "title" => Some(self.title.as_str().into()),
      DELETED_AT => Some(self.deleted_at.into()),
      _ => None,
    }
  }

  fn set(&mut self, field: &str, value: Value) -> Result<()> {
    match field {
      "title" => self.title = FromValue::from_value(field, &value)?,
      DELETED_AT => self.deleted_at = FromValue::from_value(field, &value)?,
      other => {
        return Err(Error::UnknownField {
          entity: "Article".into(),
          field:  other.into(),
        });
      }
    }
    Ok(())
  }
}

impl SoftDeletable for Article {
  fn deleted_at(&self) -> Option<Timestamp> { self.deleted_at }

  fn set_deleted_at(&mut self, deleted_at: Option<Timestamp>) { self.deleted_at = deleted_at; }
}

// ─── Tag ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
  pub id:   i64,
  pub name: String,
}

impl Entity for Tag {
  fn describe() -> EntityMetadata {
    EntityMetadata::new("Tag", "tags").with_field(FieldMapping::new("name", FieldType::Text))
  }

  fn hydrate(row: &Row) -> Result<Self> {
    Ok(Self {
      id:   read(row, "id")?,
      name: read(row, "name")?,
    })
  }

  fn id(&self) -> i64 { self.id }

  fn get(&self, field: &str) -> Option<Value> {
    match field {
      "id" => Some(self.id.into()),
      "name" => Some(self.name.as_str().into()),
      _ => None,
    }
  }

  fn set(&mut self, field: &str, value: Value) -> Result<()> {
    match field {
      "name" => self.name = FromValue::from_value(field, &value)?,
      other => {
        return Err(Error::UnknownField {
          entity: "Tag".into(),
          field:  other.into(),
        });
      }
    }
    Ok(())
  }
}
