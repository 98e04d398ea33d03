//! Encoding and decoding between [`Value`]s and SQLite column values.
//!
//! Timestamps are stored as RFC 3339 strings and booleans as `0`/`1`
//! integers. Decoding is driven by the field's mapped type, since SQLite
//! itself only knows the storage class.

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use tombstone_core::{FieldMapping, FieldType, Value};

use crate::{Error, Result};

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

// ─── Types ───────────────────────────────────────────────────────────────────

pub fn sql_type(ty: FieldType) -> &'static str {
  match ty {
    FieldType::Integer | FieldType::Boolean => "INTEGER",
    FieldType::Real => "REAL",
    FieldType::Text | FieldType::Timestamp => "TEXT",
  }
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Value ───────────────────────────────────────────────────────────────────

pub fn encode_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Integer(v) => SqlValue::Integer(*v),
    Value::Real(v) => SqlValue::Real(*v),
    Value::Text(v) => SqlValue::Text(v.clone()),
    Value::Boolean(v) => SqlValue::Integer(i64::from(*v)),
    Value::Timestamp(v) => SqlValue::Text(encode_dt(*v)),
  }
}

fn storage_class(value: &SqlValue) -> &'static str {
  match value {
    SqlValue::Null => "null",
    SqlValue::Integer(_) => "integer",
    SqlValue::Real(_) => "real",
    SqlValue::Text(_) => "text",
    SqlValue::Blob(_) => "blob",
  }
}

pub fn decode_value(mapping: &FieldMapping, raw: SqlValue) -> Result<Value> {
  let value = match (mapping.field_type, raw) {
    (_, SqlValue::Null) => Value::Null,
    (FieldType::Integer, SqlValue::Integer(v)) => Value::Integer(v),
    (FieldType::Real, SqlValue::Real(v)) => Value::Real(v),
    (FieldType::Real, SqlValue::Integer(v)) => Value::Real(v as f64),
    (FieldType::Text, SqlValue::Text(v)) => Value::Text(v),
    (FieldType::Boolean, SqlValue::Integer(v)) => Value::Boolean(v != 0),
    (FieldType::Timestamp, SqlValue::Text(v)) => Value::Timestamp(decode_dt(&v)?),
    (expected, other) => {
      return Err(Error::Decode {
        column: mapping.column_name.clone(),
        expected,
        found: storage_class(&other),
      });
    }
  };
  Ok(value)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quote_ident_escapes_quotes() {
    assert_eq!(quote_ident("deleted_at"), "\"deleted_at\"");
    assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
  }

  #[test]
  fn timestamps_are_rfc3339_text() {
    let now = Utc::now();
    let SqlValue::Text(text) = encode_value(&Value::Timestamp(now)) else {
      panic!("timestamp should encode as text");
    };
    let mapping = FieldMapping::new("deletedAt", FieldType::Timestamp).nullable();
    assert_eq!(
      decode_value(&mapping, SqlValue::Text(text)).unwrap(),
      Value::Timestamp(now)
    );
  }

  #[test]
  fn booleans_are_integers() {
    assert_eq!(encode_value(&Value::Boolean(true)), SqlValue::Integer(1));
    let mapping = FieldMapping::new("pinned", FieldType::Boolean);
    assert_eq!(
      decode_value(&mapping, SqlValue::Integer(0)).unwrap(),
      Value::Boolean(false)
    );
  }

  #[test]
  fn wrong_storage_class_is_an_error() {
    let mapping = FieldMapping::new("title", FieldType::Text);
    let err = decode_value(&mapping, SqlValue::Integer(3)).unwrap_err();
    assert!(matches!(err, Error::Decode { found: "integer", .. }));
  }

  #[test]
  fn bad_timestamp_text_is_an_error() {
    let mapping = FieldMapping::new("deletedAt", FieldType::Timestamp);
    let err = decode_value(&mapping, SqlValue::Text("yesterday".into())).unwrap_err();
    assert!(matches!(err, Error::DateParse(_)));
  }
}
