//! The output of a flush: storage statements in execution order.

use serde::Serialize;

use crate::value::Value;

/// One storage-level write. Column names, not field names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
  Insert {
    table:  String,
    values: Vec<(String, Value)>,
  },
  Update {
    table:      String,
    key_column: String,
    id:         i64,
    values:     Vec<(String, Value)>,
  },
  Delete {
    table:      String,
    key_column: String,
    id:         i64,
  },
}

impl Statement {
  pub fn table(&self) -> &str {
    match self {
      Self::Insert { table, .. }
      | Self::Update { table, .. }
      | Self::Delete { table, .. } => table,
    }
  }
}

/// Inserts first, then updates (including extra updates), deletes last.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlushPlan {
  pub statements: Vec<Statement>,
}

impl FlushPlan {
  pub fn is_empty(&self) -> bool { self.statements.is_empty() }

  pub fn len(&self) -> usize { self.statements.len() }

  pub fn iter(&self) -> std::slice::Iter<'_, Statement> { self.statements.iter() }

  pub fn inserts(&self) -> impl Iterator<Item = &Statement> {
    self.iter().filter(|s| matches!(s, Statement::Insert { .. }))
  }

  pub fn updates(&self) -> impl Iterator<Item = &Statement> {
    self.iter().filter(|s| matches!(s, Statement::Update { .. }))
  }

  pub fn deletes(&self) -> impl Iterator<Item = &Statement> {
    self.iter().filter(|s| matches!(s, Statement::Delete { .. }))
  }
}

impl<'a> IntoIterator for &'a FlushPlan {
  type Item = &'a Statement;
  type IntoIter = std::slice::Iter<'a, Statement>;

  fn into_iter(self) -> Self::IntoIter { self.iter() }
}
