//! Error type for `tombstone-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tombstone_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value cannot be read as the type its field is mapped as.
  #[error("column {column:?} holds {found}, expected {expected}")]
  Decode {
    column:   String,
    expected: tombstone_core::FieldType,
    found:    &'static str,
  },

  /// Only nullable columns can be added to an existing table.
  #[error("table {table:?} lacks non-nullable column {column:?}")]
  MissingColumn { table: String, column: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
