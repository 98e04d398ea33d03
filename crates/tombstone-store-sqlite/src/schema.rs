//! SQL generation from entity metadata and flush statements.

use rusqlite::types::Value as SqlValue;
use tombstone_core::{EntityMetadata, FieldMapping, Statement};

use crate::encode::{encode_value, quote_ident, sql_type};

fn column_definition(mapping: &FieldMapping, is_identifier: bool) -> String {
  let mut def = format!(
    "{} {}",
    quote_ident(&mapping.column_name),
    sql_type(mapping.field_type)
  );
  if is_identifier {
    def.push_str(" PRIMARY KEY");
  } else if !mapping.nullable {
    def.push_str(" NOT NULL");
  }
  def
}

/// `CREATE TABLE IF NOT EXISTS` for every mapped field.
pub fn create_table_sql(metadata: &EntityMetadata) -> String {
  let identifier = &metadata.identifier().field_name;
  let columns: Vec<String> = metadata
    .fields()
    .iter()
    .map(|f| column_definition(f, &f.field_name == identifier))
    .collect();
  format!(
    "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
    quote_ident(metadata.table_name()),
    columns.join(",\n    ")
  )
}

/// `ALTER TABLE .. ADD COLUMN` for a nullable field.
pub fn add_column_sql(table: &str, mapping: &FieldMapping) -> String {
  format!(
    "ALTER TABLE {} ADD COLUMN {}",
    quote_ident(table),
    column_definition(mapping, false)
  )
}

pub fn table_info_sql(table: &str) -> String {
  format!("PRAGMA table_info({})", quote_ident(table))
}

fn column_list(metadata: &EntityMetadata) -> String {
  metadata
    .fields()
    .iter()
    .map(|f| quote_ident(&f.column_name))
    .collect::<Vec<_>>()
    .join(", ")
}

pub fn select_all_sql(metadata: &EntityMetadata) -> String {
  format!(
    "SELECT {} FROM {} ORDER BY {}",
    column_list(metadata),
    quote_ident(metadata.table_name()),
    quote_ident(&metadata.identifier().column_name)
  )
}

pub fn select_one_sql(metadata: &EntityMetadata) -> String {
  format!(
    "SELECT {} FROM {} WHERE {} = ?1",
    column_list(metadata),
    quote_ident(metadata.table_name()),
    quote_ident(&metadata.identifier().column_name)
  )
}

pub fn next_id_sql(metadata: &EntityMetadata) -> String {
  format!(
    "SELECT COALESCE(MAX({}), 0) + 1 FROM {}",
    quote_ident(&metadata.identifier().column_name),
    quote_ident(metadata.table_name())
  )
}

/// SQL text and positional parameters for one planned statement.
pub fn statement_sql(statement: &Statement) -> (String, Vec<SqlValue>) {
  match statement {
    Statement::Insert { table, values } => {
      let columns: Vec<String> = values.iter().map(|(c, _)| quote_ident(c)).collect();
      let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
      (
        format!(
          "INSERT INTO {} ({}) VALUES ({})",
          quote_ident(table),
          columns.join(", "),
          placeholders.join(", ")
        ),
        values.iter().map(|(_, v)| encode_value(v)).collect(),
      )
    }
    Statement::Update { table, key_column, id, values } => {
      let assignments: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, (c, _))| format!("{} = ?{}", quote_ident(c), i + 1))
        .collect();
      let mut params: Vec<SqlValue> = values.iter().map(|(_, v)| encode_value(v)).collect();
      params.push(SqlValue::Integer(*id));
      (
        format!(
          "UPDATE {} SET {} WHERE {} = ?{}",
          quote_ident(table),
          assignments.join(", "),
          quote_ident(key_column),
          values.len() + 1
        ),
        params,
      )
    }
    Statement::Delete { table, key_column, id } => (
      format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote_ident(table),
        quote_ident(key_column)
      ),
      vec![SqlValue::Integer(*id)],
    ),
  }
}

#[cfg(test)]
mod tests {
  use tombstone_core::{FieldType, Value};

  use super::*;

  fn metadata() -> EntityMetadata {
    EntityMetadata::new("Article", "articles")
      .with_field(FieldMapping::new("title", FieldType::Text))
      .with_field(FieldMapping::new("deletedAt", FieldType::Timestamp).nullable())
  }

  #[test]
  fn create_table_marks_identifier_and_nullability() {
    assert_eq!(
      create_table_sql(&metadata()),
      "CREATE TABLE IF NOT EXISTS \"articles\" (\n    \"id\" INTEGER PRIMARY KEY,\n    \
       \"title\" TEXT NOT NULL,\n    \"deleted_at\" TEXT\n)"
    );
  }

  #[test]
  fn update_binds_id_last() {
    let (sql, params) = statement_sql(&Statement::Update {
      table:      "articles".into(),
      key_column: "id".into(),
      id:         1,
      values:     vec![("deleted_at".into(), Value::Null)],
    });
    assert_eq!(sql, "UPDATE \"articles\" SET \"deleted_at\" = ?1 WHERE \"id\" = ?2");
    assert_eq!(params, vec![SqlValue::Null, SqlValue::Integer(1)]);
  }

  #[test]
  fn add_column_is_nullable() {
    let mapping = FieldMapping::new("deletedAt", FieldType::Timestamp).nullable();
    assert_eq!(
      add_column_sql("articles", &mapping),
      "ALTER TABLE \"articles\" ADD COLUMN \"deleted_at\" TEXT"
    );
  }
}
