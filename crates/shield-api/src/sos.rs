//! Handlers for the emergency lifecycle.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sos` | Body: a trigger source, e.g. `{"kind":"button"}`; 202, or 200 + outcome with `?wait=true` |
//! | `POST` | `/sos/safe` | Body: `{"credential":{"kind":"pin","pin":"1234"}}`; 401 on failed authentication |
//! | `POST` | `/disguise/unlock` | Body: `{"input":"12+911"}` |
//! | `GET`  | `/status` | Current [`StatusSnapshot`] |
//! | `GET`  | `/history` | Forensic log, most recent first |
//! | `POST` | `/history/sync` | Flush pending episodes; returns `{"synced":n}` |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use shield_core::{episode::Episode, store::KvStore};
use shield_dispatch::{
  Orchestrator, StatusSnapshot, auth::Credential, triggers::TriggerSource,
};

use crate::error::ApiError;

// ─── Trigger ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TriggerParams {
  /// Hold the request open until the episode has settled.
  #[serde(default)]
  pub wait: bool,
}

/// `POST /sos[?wait=true]`
///
/// The episode runs on its own task either way, so a dropped request never
/// cancels an activation.
pub async fn trigger<S>(
  State(orch): State<Orchestrator<S>>,
  Query(params): Query<TriggerParams>,
  Json(source): Json<TriggerSource>,
) -> Result<Response, ApiError>
where
  S: KvStore + 'static,
{
  let handle = orch.spawn_trigger(source);
  if !params.wait {
    return Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response());
  }
  let outcome = handle.await.map_err(|e| ApiError::Internal(Box::new(e)))??;
  Ok(Json(outcome).into_response())
}

// ─── Safe ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SafeBody {
  #[serde(default)]
  pub credential: Option<Credential>,
}

/// `POST /sos/safe`
pub async fn safe<S>(
  State(orch): State<Orchestrator<S>>,
  Json(body): Json<SafeBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: KvStore + 'static,
{
  let state = orch.stop_sos(body.credential).await?;
  Ok(Json(json!({ "state": state })))
}

// ─── Disguise ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UnlockBody {
  pub input: String,
}

/// `POST /disguise/unlock`
pub async fn unlock<S>(
  State(orch): State<Orchestrator<S>>,
  Json(body): Json<UnlockBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: KvStore + 'static,
{
  let state = orch.leave_disguise(&body.input)?;
  Ok(Json(json!({ "state": state })))
}

// ─── Observation ──────────────────────────────────────────────────────────────

/// `GET /status`
pub async fn status<S>(State(orch): State<Orchestrator<S>>) -> Json<StatusSnapshot>
where
  S: KvStore + 'static,
{
  Json(orch.status())
}

/// `GET /history`
pub async fn history<S>(State(orch): State<Orchestrator<S>>) -> Result<Json<Vec<Episode>>, ApiError>
where
  S: KvStore + 'static,
{
  Ok(Json(orch.history().await?))
}

/// `POST /history/sync`
pub async fn sync<S>(State(orch): State<Orchestrator<S>>) -> Result<impl IntoResponse, ApiError>
where
  S: KvStore + 'static,
{
  let synced = orch.sync_pending().await?;
  Ok(Json(json!({ "synced": synced })))
}
