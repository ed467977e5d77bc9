//! Error types for `relink-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Neither identifying field was supplied with the request.
  #[error("email or phoneNumber is required")]
  MissingIdentifier,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
