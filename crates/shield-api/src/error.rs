//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The request was not authorised, e.g. a wrong PIN on "I am safe".
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// Nobody is signed in on the device.
  #[error("precondition failed: {0}")]
  PreconditionFailed(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<shield_dispatch::Error> for ApiError {
  fn from(e: shield_dispatch::Error) -> Self {
    use shield_core::Error as Core;
    use shield_dispatch::Error as Dispatch;

    match e {
      Dispatch::AuthenticationFailed => Self::Unauthorized(e.to_string()),
      Dispatch::NoCurrentUser => Self::PreconditionFailed(e.to_string()),
      Dispatch::ContactsFrozen => Self::Conflict(e.to_string()),
      Dispatch::InvalidPin => Self::BadRequest(e.to_string()),
      Dispatch::Core(Core::ContactNotFound(id)) => Self::NotFound(format!("contact {id} not found")),
      Dispatch::Core(Core::Serialization(inner)) => Self::Internal(Box::new(inner)),
      Dispatch::Core(core) => Self::BadRequest(core.to_string()),
      other => Self::Internal(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::PreconditionFailed(m) => (StatusCode::PRECONDITION_FAILED, m.clone()),
      ApiError::Internal(e) => {
        error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
