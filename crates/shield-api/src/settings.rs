//! Handlers for `/settings` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/settings` | Defaults when nothing is stored |
//! | `PUT`  | `/settings` | Full [`UserSettings`] body; re-arms the voice trigger |
//! | `GET`  | `/settings/pin` | `{"configured":bool}` |
//! | `POST` | `/settings/pin` | Body: `{"pin":"4821"}`; 204 |
//! | `POST` | `/triggers/arm` | Arm passive triggers per settings; returns the voice guard state |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use shield_core::{settings::UserSettings, store::KvStore};
use shield_dispatch::Orchestrator;

use crate::error::ApiError;

/// `GET /settings`
pub async fn get<S>(State(orch): State<Orchestrator<S>>) -> Result<Json<UserSettings>, ApiError>
where
  S: KvStore + 'static,
{
  Ok(Json(orch.settings().await?))
}

/// `PUT /settings`
pub async fn put<S>(
  State(orch): State<Orchestrator<S>>,
  Json(body): Json<UserSettings>,
) -> Result<Json<UserSettings>, ApiError>
where
  S: KvStore + 'static,
{
  Ok(Json(orch.update_settings(body).await?))
}

// ─── PIN ──────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PinBody {
  pub pin: String,
}

/// `GET /settings/pin`
pub async fn pin_status<S>(State(orch): State<Orchestrator<S>>) -> Result<impl IntoResponse, ApiError>
where
  S: KvStore + 'static,
{
  let configured = orch.has_pin().await?;
  Ok(Json(json!({ "configured": configured })))
}

/// `POST /settings/pin`
pub async fn set_pin<S>(
  State(orch): State<Orchestrator<S>>,
  Json(body): Json<PinBody>,
) -> Result<StatusCode, ApiError>
where
  S: KvStore + 'static,
{
  orch.set_pin(&body.pin).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Triggers ─────────────────────────────────────────────────────────────────

/// `POST /triggers/arm`
pub async fn arm<S>(State(orch): State<Orchestrator<S>>) -> Result<impl IntoResponse, ApiError>
where
  S: KvStore + 'static,
{
  let voice = orch.arm_triggers().await?;
  Ok(Json(json!({ "voice": voice })))
}
