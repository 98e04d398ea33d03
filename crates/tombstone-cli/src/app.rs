//! Command implementations over one store and one entity manager.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Serialize;
use tombstone_core::{
  Entity, EntityKey, EntityManager, EntityMetadata, FlushPlan, Row, Timestamp, Value,
};
use tombstone_soft_delete::{DELETED_AT, SoftDeletable, SoftDeleteInterceptor};
use tombstone_store_sqlite::SqliteStore;

use crate::entities::{Article, Tag};

/// Outcome of a `delete` command.
#[derive(Debug, Serialize)]
pub struct DeleteReport {
  pub entity:              String,
  /// `true` if the row was kept and only `deleted_at` was written.
  pub soft:                bool,
  /// Set when the entity was already soft-deleted before this call.
  pub previous_deleted_at: Option<Timestamp>,
  pub plan:                FlushPlan,
}

// ─── App ─────────────────────────────────────────────────────────────────────

pub struct App {
  store: SqliteStore,
  em:    EntityManager,
}

impl App {
  /// Register soft deletes for [`Article`] and bring both tables up to date.
  pub async fn open(store: SqliteStore) -> Result<Self> {
    let mut em = EntityManager::default();
    em.add_listener(Arc::new(SoftDeleteInterceptor::new().with::<Article>()));

    let mut app = Self { store, em };
    for metadata in app.schema()? {
      app
        .store
        .ensure_table(&metadata)
        .await
        .with_context(|| format!("failed to prepare table {:?}", metadata.table_name()))?;
    }
    Ok(app)
  }

  /// Mapping of every entity type, as the store sees it.
  pub fn schema(&mut self) -> Result<Vec<EntityMetadata>> {
    Ok(vec![
      (*self.em.metadata_for::<Article>()?).clone(),
      (*self.em.metadata_for::<Tag>()?).clone(),
    ])
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  pub async fn add_article(&mut self, title: String) -> Result<Article> {
    let id = self.next_id::<Article>().await?;
    let article = Article::new(id, title);
    self.em.persist(article.clone())?;
    self.flush().await?;
    Ok(article)
  }

  pub async fn add_tag(&mut self, name: String) -> Result<Tag> {
    let id = self.next_id::<Tag>().await?;
    let tag = Tag { id, name };
    self.em.persist(tag.clone())?;
    self.flush().await?;
    Ok(tag)
  }

  /// Delete an entity. Soft-deletable types keep their row.
  pub async fn delete<T: Entity>(&mut self, id: i64) -> Result<DeleteReport> {
    let key = self.load::<T>(id).await?;
    let previous_deleted_at = self
      .em
      .unit_of_work()
      .original_data(&key)
      .and_then(|row| row.get(DELETED_AT))
      .and_then(Value::as_timestamp);

    self.em.remove(&key)?;
    let plan = self.flush().await?;
    let soft = plan.deletes().next().is_none();
    Ok(DeleteReport {
      entity: key.to_string(),
      soft,
      previous_deleted_at,
      plan,
    })
  }

  pub async fn restore(&mut self, id: i64) -> Result<Article> {
    self.load::<Article>(id).await?;
    let article = self.em.get_mut::<Article>(id)?;
    article.restore();
    let article = article.clone();
    self.flush().await?;
    Ok(article)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// Stored articles. Soft-deleted ones are hidden unless `with_deleted`.
  pub async fn articles(&mut self, with_deleted: bool) -> Result<Vec<Article>> {
    let mut articles = Vec::new();
    for row in self.rows::<Article>().await? {
      let article = Article::hydrate(&row)?;
      if with_deleted || !article.is_deleted() {
        articles.push(article);
      }
    }
    Ok(articles)
  }

  pub async fn tags(&mut self) -> Result<Vec<Tag>> {
    let rows = self.rows::<Tag>().await?;
    Ok(rows.iter().map(Tag::hydrate).collect::<Result<_, _>>()?)
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn next_id<T: Entity>(&mut self) -> Result<i64> {
    let metadata = self.em.metadata_for::<T>()?;
    Ok(self.store.next_id(&metadata).await?)
  }

  async fn rows<T: Entity>(&mut self) -> Result<Vec<Row>> {
    let metadata = self.em.metadata_for::<T>()?;
    Ok(self.store.fetch_all(&metadata).await?)
  }

  /// Track the stored entity `id`, reusing it if this session already
  /// tracks it.
  async fn load<T: Entity>(&mut self, id: i64) -> Result<EntityKey> {
    let key = self.em.key_for::<T>(id)?;
    if self.em.unit_of_work().contains(&key) {
      return Ok(key);
    }

    let metadata = self.em.metadata_for::<T>()?;
    let row = self
      .store
      .fetch(&metadata, id)
      .await?
      .with_context(|| format!("{} {id} not found", metadata.entity_name()))?;
    Ok(self.em.load::<T>(&row)?)
  }

  async fn flush(&mut self) -> Result<FlushPlan> {
    let plan = self.em.flush()?;
    self
      .store
      .execute(&plan)
      .await
      .context("failed to write flush plan")?;
    Ok(plan)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  async fn app() -> App {
    let store = SqliteStore::open_in_memory().await.unwrap();
    App::open(store).await.unwrap()
  }

  #[tokio::test]
  async fn ids_are_assigned_in_sequence() {
    let mut app = app().await;
    assert_eq!(app.add_article("one".into()).await.unwrap().id, 1);
    assert_eq!(app.add_article("two".into()).await.unwrap().id, 2);
    assert_eq!(app.add_tag("rust".into()).await.unwrap().id, 1);
  }

  #[tokio::test]
  async fn deleted_article_is_hidden_but_kept() {
    let mut app = app().await;
    app.add_article("Hello".into()).await.unwrap();

    let report = app.delete::<Article>(1).await.unwrap();
    assert!(report.soft);
    assert_eq!(report.entity, "Article#1");

    assert!(app.articles(false).await.unwrap().is_empty());
    let all = app.articles(true).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].is_deleted());
  }

  #[tokio::test]
  async fn deleted_tag_is_gone() {
    let mut app = app().await;
    app.add_tag("rust".into()).await.unwrap();

    let report = app.delete::<Tag>(1).await.unwrap();
    assert!(!report.soft);
    assert_eq!(report.plan.deletes().count(), 1);
    assert!(app.tags().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn restore_brings_article_back() {
    let mut app = app().await;
    app.add_article("Hello".into()).await.unwrap();
    app.delete::<Article>(1).await.unwrap();

    let restored = app.restore(1).await.unwrap();
    assert!(restored.deleted_at.is_none());
    assert_eq!(app.articles(false).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn one_session_adds_deletes_lists_and_restores() {
    let mut app = app().await;
    app.add_article("first".into()).await.unwrap();
    app.add_article("second".into()).await.unwrap();
    app.add_tag("rust".into()).await.unwrap();

    assert!(app.delete::<Article>(1).await.unwrap().soft);
    assert!(!app.delete::<Tag>(1).await.unwrap().soft);

    let visible = app.articles(false).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "second");
    assert_eq!(app.articles(true).await.unwrap().len(), 2);
    assert!(app.tags().await.unwrap().is_empty());

    app.restore(1).await.unwrap();
    let titles: Vec<String> = app
      .articles(false)
      .await
      .unwrap()
      .into_iter()
      .map(|a| a.title)
      .collect();
    assert_eq!(titles, ["first", "second"]);

    // A hard-deleted tag is no longer tracked or stored.
    assert!(app.delete::<Tag>(1).await.is_err());
  }

  #[tokio::test]
  async fn deleting_again_reports_previous_timestamp() {
    let mut app = app().await;
    app.add_article("Hello".into()).await.unwrap();

    let first = app.delete::<Article>(1).await.unwrap();
    assert!(first.previous_deleted_at.is_none());
    let stamped = app.articles(true).await.unwrap()[0].deleted_at.unwrap();

    let second = app.delete::<Article>(1).await.unwrap();
    assert!(second.soft);
    assert_eq!(second.previous_deleted_at, Some(stamped));
    let restamped = app.articles(true).await.unwrap()[0].deleted_at.unwrap();
    assert!(restamped >= stamped);
  }

  #[tokio::test]
  async fn deleting_missing_row_fails() {
    let mut app = app().await;
    let err = app.delete::<Article>(7).await.unwrap_err();
    assert!(err.to_string().contains("Article 7 not found"));
  }

  #[tokio::test]
  async fn schema_includes_deleted_at_for_articles_only() {
    let mut app = app().await;
    let schema = app.schema().unwrap();
    assert!(schema[0].has_field("deletedAt"));
    assert!(!schema[1].has_field("deletedAt"));
  }
}
