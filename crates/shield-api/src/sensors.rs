//! Handlers that feed device observations into the orchestrator.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sensors/motion` | Body: `{"x":..,"y":..,"z":..}` in m/s²; `{"fired":bool}` |
//! | `POST` | `/sensors/transcript` | Body: `{"transcript":"..."}`; `{"phrase":..}` when it triggered |
//! | `POST` | `/sensors/voice/fault` | Body: a recognizer fault, e.g. `"no_speech"` |
//! | `POST` | `/sensors/voice/end` | The recognizer session ended |
//! | `POST` | `/location` | Body: `{"latitude":..,"longitude":..}`; 204 |
//! | `GET`  | `/network` | Last published [`NetworkStatus`] |
//! | `POST` | `/network/refresh` | Re-read connectivity; flushes pending logs when online |

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use shield_core::{
  location::Location, network::NetworkStatus, ports::RecognizerFault, store::KvStore,
};
use shield_dispatch::{Orchestrator, triggers::Acceleration};

use crate::error::ApiError;

/// `POST /sensors/motion`
pub async fn motion<S>(
  State(orch): State<Orchestrator<S>>,
  Json(sample): Json<Acceleration>,
) -> Result<impl IntoResponse, ApiError>
where
  S: KvStore + 'static,
{
  let fired = orch.observe_motion(sample).await?;
  Ok(Json(json!({ "fired": fired })))
}

#[derive(Debug, Deserialize)]
pub struct TranscriptBody {
  pub transcript: String,
}

/// `POST /sensors/transcript`
pub async fn transcript<S>(
  State(orch): State<Orchestrator<S>>,
  Json(body): Json<TranscriptBody>,
) -> impl IntoResponse
where
  S: KvStore + 'static,
{
  let phrase = orch.observe_transcript(&body.transcript);
  Json(json!({ "phrase": phrase }))
}

/// `POST /sensors/voice/fault`
pub async fn voice_fault<S>(
  State(orch): State<Orchestrator<S>>,
  Json(fault): Json<RecognizerFault>,
) -> impl IntoResponse
where
  S: KvStore + 'static,
{
  let guard = orch.voice_guard();
  guard.on_fault(fault);
  Json(json!({ "voice": guard.state() }))
}

/// `POST /sensors/voice/end`
pub async fn voice_end<S>(State(orch): State<Orchestrator<S>>) -> impl IntoResponse
where
  S: KvStore + 'static,
{
  let guard = orch.voice_guard();
  guard.on_end();
  Json(json!({ "voice": guard.state() }))
}

/// `POST /location`
pub async fn location<S>(
  State(orch): State<Orchestrator<S>>,
  Json(location): Json<Location>,
) -> StatusCode
where
  S: KvStore + 'static,
{
  orch.observe_location(location);
  StatusCode::NO_CONTENT
}

/// `GET /network`
pub async fn network<S>(State(orch): State<Orchestrator<S>>) -> Json<NetworkStatus>
where
  S: KvStore + 'static,
{
  Json(orch.network())
}

/// `POST /network/refresh`
pub async fn refresh<S>(State(orch): State<Orchestrator<S>>) -> Json<NetworkStatus>
where
  S: KvStore + 'static,
{
  Json(orch.refresh_network().await)
}
