//! Handlers for `/contacts` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/contacts` | Seeded with the national emergency service on first use |
//! | `POST`   | `/contacts` | Body: `{"name":"Asha","phone":"98765 43210"}`; 201, 400 on validation, 409 during an emergency |
//! | `DELETE` | `/contacts/{id}` | 404 if not found, 409 during an emergency |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use shield_core::{
  contact::{Contact, NewContact},
  store::KvStore,
};
use shield_dispatch::Orchestrator;
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /contacts`
pub async fn list<S>(State(orch): State<Orchestrator<S>>) -> Result<Json<Vec<Contact>>, ApiError>
where
  S: KvStore + 'static,
{
  let book = orch.contacts().await?;
  Ok(Json(book.contacts().to_vec()))
}

/// `POST /contacts`
pub async fn create<S>(
  State(orch): State<Orchestrator<S>>,
  Json(body): Json<NewContact>,
) -> Result<impl IntoResponse, ApiError>
where
  S: KvStore + 'static,
{
  let contact = orch.add_contact(body).await?;
  Ok((StatusCode::CREATED, Json(contact)))
}

/// `DELETE /contacts/{id}`
pub async fn remove<S>(
  State(orch): State<Orchestrator<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Contact>, ApiError>
where
  S: KvStore + 'static,
{
  Ok(Json(orch.remove_contact(id).await?))
}
