//! [`SqliteStore`] executes flush plans against a SQLite database.

use std::path::Path;

use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use tombstone_core::{EntityMetadata, FlushPlan, Row};

use crate::{
  Error, Result,
  encode::decode_value,
  schema::{
    add_column_sql, create_table_sql, next_id_sql, select_all_sql, select_one_sql,
    statement_sql, table_info_sql,
  },
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Tombstone store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path`.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init().await?;
    Ok(store)
  }

  async fn init(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Schema ────────────────────────────────────────────────────────────────

  /// Column names of `table`, in declaration order. Empty if the table does
  /// not exist.
  pub async fn columns(&self, table: &str) -> Result<Vec<String>> {
    let sql = table_info_sql(table);
    let columns = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let names = stmt
          .query_map([], |row| row.get::<_, String>(1))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
      })
      .await?;
    Ok(columns)
  }

  /// Create the entity's table, or add any nullable mapped columns an
  /// existing table is missing.
  pub async fn ensure_table(&self, metadata: &EntityMetadata) -> Result<()> {
    let create = create_table_sql(metadata);
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&create)?;
        Ok(())
      })
      .await?;

    let existing = self.columns(metadata.table_name()).await?;
    let mut alters = Vec::new();
    for mapping in metadata.fields() {
      if existing.contains(&mapping.column_name) {
        continue;
      }
      if !mapping.nullable {
        return Err(Error::MissingColumn {
          table:  metadata.table_name().to_owned(),
          column: mapping.column_name.clone(),
        });
      }
      alters.push(add_column_sql(metadata.table_name(), mapping));
    }

    if !alters.is_empty() {
      tracing::info!(
        table = metadata.table_name(),
        added = alters.len(),
        "adding missing columns"
      );
      self
        .conn
        .call(move |conn| {
          let tx = conn.transaction()?;
          for sql in &alters {
            tx.execute_batch(sql)?;
          }
          tx.commit()?;
          Ok(())
        })
        .await?;
    }
    Ok(())
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Run every statement of `plan` in one transaction. Returns the number of
  /// rows affected.
  pub async fn execute(&self, plan: &FlushPlan) -> Result<usize> {
    if plan.is_empty() {
      return Ok(0);
    }
    let statements: Vec<(String, Vec<SqlValue>)> = plan.iter().map(statement_sql).collect();

    let affected = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut affected = 0;
        for (sql, params) in &statements {
          affected += tx.execute(sql, rusqlite::params_from_iter(params.iter()))?;
        }
        tx.commit()?;
        Ok(affected)
      })
      .await?;

    tracing::debug!(statements = plan.len(), affected, "flush plan executed");
    Ok(affected)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// Every row of the entity's table, ordered by identifier, soft-deleted or
  /// not.
  pub async fn fetch_all(&self, metadata: &EntityMetadata) -> Result<Vec<Row>> {
    let sql = select_all_sql(metadata);
    let width = metadata.fields().len();

    let raws: Vec<Vec<SqlValue>> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| {
            (0..width)
              .map(|i| row.get::<_, SqlValue>(i))
              .collect::<rusqlite::Result<Vec<_>>>()
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(|raw| decode_row(metadata, raw)).collect()
  }

  pub async fn fetch(&self, metadata: &EntityMetadata, id: i64) -> Result<Option<Row>> {
    let sql = select_one_sql(metadata);
    let width = metadata.fields().len();

    let raw: Option<Vec<SqlValue>> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id], |row| {
              (0..width)
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
            })
            .optional()?,
        )
      })
      .await?;

    raw.map(|raw| decode_row(metadata, raw)).transpose()
  }

  /// One past the largest stored identifier.
  pub async fn next_id(&self, metadata: &EntityMetadata) -> Result<i64> {
    let sql = next_id_sql(metadata);
    let id = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get::<_, i64>(0))?))
      .await?;
    Ok(id)
  }
}

fn decode_row(metadata: &EntityMetadata, raw: Vec<SqlValue>) -> Result<Row> {
  metadata
    .fields()
    .iter()
    .zip(raw)
    .map(|(mapping, value)| {
      decode_value(mapping, value).map(|v| (mapping.field_name.clone(), v))
    })
    .collect()
}
