//! The [`SoftDeletable`] contract.

use chrono::Utc;
use tombstone_core::Timestamp;

/// Field name of the deletion timestamp.
pub const DELETED_AT: &str = "deletedAt";

/// Column the deletion timestamp is stored in.
pub const DELETED_AT_COLUMN: &str = "deleted_at";

/// An entity that is marked deleted instead of being removed.
///
/// `None` means not deleted. Implementors only store the timestamp; every
/// other method has a default built on the two accessors.
pub trait SoftDeletable {
  fn deleted_at(&self) -> Option<Timestamp>;

  fn set_deleted_at(&mut self, deleted_at: Option<Timestamp>);

  /// Mark the entity deleted as of now. Calling it again moves the
  /// timestamp forward.
  fn delete(&mut self) { self.set_deleted_at(Some(Utc::now())); }

  fn restore(&mut self) { self.set_deleted_at(None); }

  /// Deleted, and the deletion time is not in the future.
  fn is_deleted(&self) -> bool {
    self.deleted_at().is_some_and(|at| at <= Utc::now())
  }

  /// With `Some(at)`: the deletion time is at or before `at`. With `None`:
  /// any deletion time is set, past or future.
  fn will_be_deleted(&self, at: Option<Timestamp>) -> bool {
    match (self.deleted_at(), at) {
      (None, _) => false,
      (Some(_), None) => true,
      (Some(deleted_at), Some(at)) => deleted_at <= at,
    }
  }
}
