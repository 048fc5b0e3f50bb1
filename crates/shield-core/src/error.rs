//! Error types for `shield-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("contact name must be at least {min} characters")]
  NameTooShort { min: usize },

  #[error("invalid phone number: {0:?}")]
  InvalidPhone(String),

  #[error("{0} looks like a dummy number")]
  DummyNumber(String),

  #[error("{0} is already in your trusted contacts")]
  DuplicatePhone(String),

  #[error("contact not found: {0}")]
  ContactNotFound(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type returned by platform ports, which wrap arbitrary backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
