//! Field values and their mapped types.
//!
//! Entities expose their state to the unit of work as [`Value`]s keyed by
//! field name. A [`Row`] is the flat form of one entity, used both for
//! change-tracking snapshots and for hydrating entities loaded from storage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::{Error, Result};

pub type Timestamp = DateTime<Utc>;

/// One entity's field values keyed by field name.
pub type Row = BTreeMap<String, Value>;

// ─── FieldType ───────────────────────────────────────────────────────────────

/// The storage type a field is mapped as.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FieldType {
  Integer,
  Real,
  Text,
  Boolean,
  Timestamp,
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// A single field value as seen by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
  Boolean(bool),
  Timestamp(Timestamp),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  /// Short name of the variant, used in error messages.
  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Null => "null",
      Self::Integer(_) => "integer",
      Self::Real(_) => "real",
      Self::Text(_) => "text",
      Self::Boolean(_) => "boolean",
      Self::Timestamp(_) => "timestamp",
    }
  }

  /// Whether this value can be stored in a field of type `ty`. `Null`
  /// matches every type; nullability is checked separately.
  pub fn matches(&self, ty: FieldType) -> bool {
    matches!(
      (self, ty),
      (Self::Null, _)
        | (Self::Integer(_), FieldType::Integer)
        | (Self::Real(_), FieldType::Real)
        | (Self::Text(_), FieldType::Text)
        | (Self::Boolean(_), FieldType::Boolean)
        | (Self::Timestamp(_), FieldType::Timestamp)
    )
  }

  pub fn as_timestamp(&self) -> Option<Timestamp> {
    match self {
      Self::Timestamp(at) => Some(*at),
      _ => None,
    }
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self { Self::Integer(v) }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self { Self::Real(v) }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self { Self::Boolean(v) }
}

impl From<String> for Value {
  fn from(v: String) -> Self { Self::Text(v) }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<Timestamp> for Value {
  fn from(v: Timestamp) -> Self { Self::Timestamp(v) }
}

impl<T: Into<Value>> From<Option<T>> for Value {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

/// Conversion from a [`Value`] back into a Rust field type.
///
/// `field` is only used to label errors.
pub trait FromValue: Sized {
  fn from_value(field: &str, value: &Value) -> Result<Self>;
}

fn mismatch(field: &str, expected: FieldType, found: &Value) -> Error {
  match found {
    Value::Null => Error::UnexpectedNull(field.to_owned()),
    other => Error::TypeMismatch {
      field: field.to_owned(),
      expected,
      found: other.type_name(),
    },
  }
}

impl FromValue for i64 {
  fn from_value(field: &str, value: &Value) -> Result<Self> {
    match value {
      Value::Integer(v) => Ok(*v),
      other => Err(mismatch(field, FieldType::Integer, other)),
    }
  }
}

impl FromValue for f64 {
  fn from_value(field: &str, value: &Value) -> Result<Self> {
    match value {
      Value::Real(v) => Ok(*v),
      Value::Integer(v) => Ok(*v as f64),
      other => Err(mismatch(field, FieldType::Real, other)),
    }
  }
}

impl FromValue for bool {
  fn from_value(field: &str, value: &Value) -> Result<Self> {
    match value {
      Value::Boolean(v) => Ok(*v),
      other => Err(mismatch(field, FieldType::Boolean, other)),
    }
  }
}

impl FromValue for String {
  fn from_value(field: &str, value: &Value) -> Result<Self> {
    match value {
      Value::Text(v) => Ok(v.clone()),
      other => Err(mismatch(field, FieldType::Text, other)),
    }
  }
}

impl FromValue for Timestamp {
  fn from_value(field: &str, value: &Value) -> Result<Self> {
    match value {
      Value::Timestamp(v) => Ok(*v),
      other => Err(mismatch(field, FieldType::Timestamp, other)),
    }
  }
}

impl<T: FromValue> FromValue for Option<T> {
  fn from_value(field: &str, value: &Value) -> Result<Self> {
    match value {
      Value::Null => Ok(None),
      other => T::from_value(field, other).map(Some),
    }
  }
}

/// Read `field` out of a row. A missing field reads as `Null`, so it is only
/// accepted for `Option` targets.
pub fn read<T: FromValue>(row: &Row, field: &str) -> Result<T> {
  T::from_value(field, row.get(field).unwrap_or(&Value::Null))
}
