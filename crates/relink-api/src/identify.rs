//! Handler for `POST /identify`.
//!
//! Body: `{"email": ..., "phoneNumber": ...}` — both optional, at least one
//! required. Responds with the merged cluster view for the identity.

use std::sync::Arc;

use axum::{Json, extract::State};
use relink_core::{
  contact::ResolvedCluster,
  query::IdentifyQuery,
  store::IdentityResolver,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyBody {
  pub email:        Option<String>,
  pub phone_number: Option<String>,
}

/// Response envelope: the cluster view nested under `contact`.
#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
  pub contact: ResolvedCluster,
}

/// `POST /identify`
pub async fn handler<S>(
  State(resolver): State<Arc<S>>,
  Json(body): Json<IdentifyBody>,
) -> Result<Json<IdentifyResponse>, ApiError>
where
  S: IdentityResolver,
{
  let has_email = body.email.is_some();
  let has_phone = body.phone_number.is_some();

  let query = IdentifyQuery::new(body.email, body.phone_number)
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

  let contact = resolver.identify(query).await.map_err(|e| {
    tracing::error!(error = %e, has_email, has_phone, "identity resolution failed");
    ApiError::Store(Box::new(e))
  })?;

  Ok(Json(IdentifyResponse { contact }))
}
