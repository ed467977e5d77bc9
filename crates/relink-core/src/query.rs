//! The validated identify request.

use crate::{Error, Result};

/// A request that has passed input validation: at least one of email and
/// phone number is present. Constructing one is the only way to reach the
/// resolution engine, so the engine never sees an empty query.
#[derive(Debug, Clone)]
pub struct IdentifyQuery {
  email:        Option<String>,
  phone_number: Option<String>,
}

impl IdentifyQuery {
  /// Build a query, rejecting input with neither identifier.
  pub fn new(email: Option<String>, phone_number: Option<String>) -> Result<Self> {
    if email.is_none() && phone_number.is_none() {
      return Err(Error::MissingIdentifier);
    }
    Ok(Self { email, phone_number })
  }

  pub fn email(&self) -> Option<&str> {
    self.email.as_deref()
  }

  pub fn phone_number(&self) -> Option<&str> {
    self.phone_number.as_deref()
  }
}
