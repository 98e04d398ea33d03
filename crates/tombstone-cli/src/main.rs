//! `tombstone`: a small article/tag store demonstrating soft deletes.
//!
//! Articles are soft-deletable: deleting one only stamps `deleted_at`, and
//! `restore` clears it again. Tags are deleted outright.
//!
//! # Usage
//!
//! ```text
//! tombstone add-article "Hello"
//! tombstone delete article 1
//! tombstone list article --with-deleted
//! tombstone --store /tmp/demo.db schema
//! ```
//!
//! Settings come from `tombstone.toml` (or `--config`) and `TOMBSTONE_*`
//! environment variables. Every command prints JSON on stdout; logs go to
//! stderr.

mod app;
mod entities;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use app::App;
use clap::{Parser, Subcommand, ValueEnum};
use entities::{Article, Tag};
use serde::{Deserialize, Serialize};
use tombstone_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tombstone", version, about = "Soft-delete demo store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "tombstone.toml")]
  config: PathBuf,

  /// SQLite database path. Overrides `store_path` from the config.
  #[arg(long, value_name = "PATH")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create an article.
  AddArticle { title: String },
  /// Create a tag.
  AddTag { name: String },
  /// Delete an article (soft) or a tag (hard).
  Delete { kind: Kind, id: i64 },
  /// Clear an article's deletion timestamp.
  Restore { id: i64 },
  /// List stored entities.
  List {
    kind: Kind,
    /// Include soft-deleted articles.
    #[arg(long)]
    with_deleted: bool,
  },
  /// Print the entity mappings.
  Schema,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
  Article,
  Tag,
}

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct Settings {
  store_path: PathBuf,
  /// `tracing` filter directives, e.g. `tombstone_soft_delete=debug`.
  log_filter: Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("tombstone.db"),
      log_filter: None,
    }
  }
}

fn load_settings(path: PathBuf) -> Result<Settings> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("TOMBSTONE"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise Settings")
}

fn init_tracing(filter: Option<&str>) -> Result<()> {
  let filter = match filter {
    Some(directives) => {
      EnvFilter::try_new(directives).with_context(|| format!("invalid log filter {directives:?}"))?
    }
    None => EnvFilter::builder()
      .with_default_directive(LevelFilter::INFO.into())
      .from_env_lossy(),
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
  Ok(())
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let settings = load_settings(cli.config)?;
  init_tracing(settings.log_filter.as_deref())?;

  let store_path = cli.store.unwrap_or(settings.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let mut app = App::open(store).await?;

  match cli.command {
    Command::AddArticle { title } => print(&app.add_article(title).await?),
    Command::AddTag { name } => print(&app.add_tag(name).await?),
    Command::Delete { kind: Kind::Article, id } => print(&app.delete::<Article>(id).await?),
    Command::Delete { kind: Kind::Tag, id } => print(&app.delete::<Tag>(id).await?),
    Command::Restore { id } => print(&app.restore(id).await?),
    Command::List { kind: Kind::Article, with_deleted } => {
      print(&app.articles(with_deleted).await?)
    }
    Command::List { kind: Kind::Tag, .. } => print(&app.tags().await?),
    Command::Schema => print(&app.schema()?),
  }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
  let json = serde_json::to_string_pretty(value).context("failed to serialise output")?;
  println!("{json}");
  Ok(())
}
