//! JSON HTTP API for Relink.
//!
//! Exposes an axum [`Router`] backed by any
//! [`IdentityResolver`](relink_core::store::IdentityResolver). Transport and
//! TLS concerns are the caller's responsibility.

pub mod error;
pub mod identify;

use std::sync::Arc;

use axum::{Router, routing::post};
use relink_core::store::IdentityResolver;

pub use error::ApiError;

/// Build a fully-materialised API router for `resolver`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(resolver: Arc<S>) -> Router<()>
where
  S: IdentityResolver + 'static,
{
  Router::new()
    .route("/identify", post(identify::handler::<S>))
    .with_state(resolver)
}

// ─── Integration tests ───────────────────────────────────────────────────────
