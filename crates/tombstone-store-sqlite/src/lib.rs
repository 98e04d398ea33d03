//! SQLite backend for Tombstone.
//!
//! Executes the [`FlushPlan`](tombstone_core::FlushPlan)s produced by an
//! entity manager and loads stored rows back for hydration. Wraps
//! [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
