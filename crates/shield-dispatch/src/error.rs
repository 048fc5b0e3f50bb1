//! Error type for `shield-dispatch`.
//!
//! Transient platform failures never surface here; they are logged and
//! replaced by a fallback at the step that produced them.

use shield_core::BoxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The only hard failure of an episode: "I am safe" was not authorised.
  #[error("authentication failed")]
  AuthenticationFailed,

  #[error("no user is signed in")]
  NoCurrentUser,

  #[error("contacts cannot be changed during an active emergency")]
  ContactsFrozen,

  #[error("PIN must be 4 to 6 digits")]
  InvalidPin,

  #[error("PIN hashing failed: {0}")]
  PinHash(String),

  #[error(transparent)]
  Core(#[from] shield_core::Error),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
