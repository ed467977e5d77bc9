//! Store traits: the per-unit-of-work operations the engine drives, and the
//! async resolution seam the HTTP layer consumes.
//!
//! Storage backends (e.g. `relink-store-sqlite`) implement both. Higher
//! layers depend on these abstractions, not on any concrete backend.

use std::future::Future;

use crate::{
  contact::{Contact, ResolvedCluster},
  query::IdentifyQuery,
};

// ─── Unit-of-work operations ─────────────────────────────────────────────────

/// Operations the resolution engine performs against one open unit of work.
///
/// Every method sees only fragments that are not soft-deleted. A backend
/// implements this for the duration of a single transaction so that all
/// reads and writes of one resolution either land together or not at all.
pub trait ContactStore {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fragments whose email or phone number equals the given value. An
  /// absent parameter never matches anything.
  fn find_by_email_or_phone(
    &mut self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> Result<Vec<Contact>, Self::Error>;

  /// Create a new primary fragment carrying the given fields.
  fn insert_primary(
    &mut self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> Result<Contact, Self::Error>;

  /// Create a new secondary fragment linked to `primary_id`.
  fn insert_secondary(
    &mut self,
    email: Option<&str>,
    phone: Option<&str>,
    primary_id: i64,
  ) -> Result<Contact, Self::Error>;

  /// Re-point a fragment at `primary_id` as a secondary and refresh its
  /// `updated_at`. Calling this on a fragment already linked to
  /// `primary_id` must not be observable beyond the timestamp refresh.
  fn demote(&mut self, id: i64, primary_id: i64) -> Result<(), Self::Error>;

  /// The fragment with `id = primary_id` plus every fragment linked to it.
  fn fetch_cluster(&mut self, primary_id: i64) -> Result<Vec<Contact>, Self::Error>;
}

// ─── Resolution seam ─────────────────────────────────────────────────────────

/// The async seam consumed by the HTTP layer.
///
/// Implementations run the full resolution for `query` as one atomic unit of
/// work: either every mutation lands or none does.
pub trait IdentityResolver: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn identify(
    &self,
    query: IdentifyQuery,
  ) -> impl Future<Output = Result<ResolvedCluster, Self::Error>> + Send + '_;
}
