//! Soft-delete behavior for Tombstone entities.
//!
//! Entity types opt in by implementing [`SoftDeletable`] and being registered
//! with a [`SoftDeleteInterceptor`]. The interceptor maps a nullable
//! `deletedAt` timestamp onto their metadata and, at flush time, turns every
//! scheduled deletion of such an entity into an update of that field.
//!
//! ```ignore
//! let interceptor = SoftDeleteInterceptor::new().with::<Article>();
//! let mut em = EntityManager::default();
//! em.add_listener(Arc::new(interceptor));
//! ```

mod interceptor;
mod soft_deletable;

pub use interceptor::SoftDeleteInterceptor;
pub use soft_deletable::{DELETED_AT, DELETED_AT_COLUMN, SoftDeletable};
