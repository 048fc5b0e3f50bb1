//! JSON API for the shield SOS client.
//!
//! Exposes an axum [`Router`] over an [`Orchestrator`], for a presentation
//! layer to drive the emergency lifecycle, manage contacts and settings, and
//! feed sensor observations. Auth, TLS, and transport concerns are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", shield_api::api_router(orchestrator.clone()))
//! ```

pub mod contacts;
pub mod error;
pub mod sensors;
pub mod settings;
pub mod sos;

use axum::{
  Router,
  routing::{delete, get, post},
};
use shield_core::store::KvStore;
use shield_dispatch::Orchestrator;

pub use error::ApiError;

/// Build a fully-materialised API router for `orch`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(orch: Orchestrator<S>) -> Router<()>
where
  S: KvStore + 'static,
{
  Router::new()
    // Emergency lifecycle
    .route("/sos", post(sos::trigger::<S>))
    .route("/sos/safe", post(sos::safe::<S>))
    .route("/disguise/unlock", post(sos::unlock::<S>))
    .route("/status", get(sos::status::<S>))
    .route("/history", get(sos::history::<S>))
    .route("/history/sync", post(sos::sync::<S>))
    // Contacts
    .route("/contacts", get(contacts::list::<S>).post(contacts::create::<S>))
    .route("/contacts/{id}", delete(contacts::remove::<S>))
    // Settings
    .route("/settings", get(settings::get::<S>).put(settings::put::<S>))
    .route("/settings/pin", get(settings::pin_status::<S>).post(settings::set_pin::<S>))
    .route("/triggers/arm", post(settings::arm::<S>))
    // Sensors
    .route("/sensors/motion", post(sensors::motion::<S>))
    .route("/sensors/transcript", post(sensors::transcript::<S>))
    .route("/sensors/voice/fault", post(sensors::voice_fault::<S>))
    .route("/sensors/voice/end", post(sensors::voice_end::<S>))
    .route("/location", post(sensors::location::<S>))
    .route("/network", get(sensors::network::<S>))
    .route("/network/refresh", post(sensors::refresh::<S>))
    .with_state(orch)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::{Value, json};
  use shield_core::{contact::SEED_CONTACT_ID, store::MemoryStore};
  use shield_dispatch::{
    OrchestratorConfig,
    testing::{FakePlatform, settle},
  };
  use tower::ServiceExt;
  use uuid::Uuid;

  use super::*;

  fn app(fakes: &FakePlatform) -> Router {
    let orch = Orchestrator::new(
      Arc::new(MemoryStore::new()),
      fakes.platform(),
      OrchestratorConfig::default(),
    );
    api_router(orch)
  }

  async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp   = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes  = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value  = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  // ── SOS ─────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn trigger_with_wait_reports_activation() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    let (status, body) = call(&app, "POST", "/sos?wait=true", Some(json!({ "kind": "button" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "activated");
    assert_eq!(body["call_placed"], true);
    assert_eq!(body["transport"], "CLOUD");

    let (_, snapshot) = call(&app, "GET", "/status", None).await;
    assert_eq!(snapshot["state"], "EMERGENCY");
    assert_eq!(snapshot["siren_active"], true);

    let (_, history) = call(&app, "GET", "/history", None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn trigger_without_wait_is_accepted() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    let (status, body) = call(&app, "POST", "/sos", Some(json!({ "kind": "shake" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], true);

    settle().await;
    let (_, snapshot) = call(&app, "GET", "/status", None).await;
    assert_eq!(snapshot["state"], "EMERGENCY");
  }

  #[tokio::test]
  async fn safe_checks_the_pin() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    let (status, _) = call(&app, "POST", "/settings/pin", Some(json!({ "pin": "4821" }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, pin) = call(&app, "GET", "/settings/pin", None).await;
    assert_eq!(pin["configured"], true);

    call(&app, "POST", "/sos?wait=true", Some(json!({ "kind": "button" }))).await;

    let wrong = json!({ "credential": { "kind": "pin", "pin": "0000" } });
    let (status, body) = call(&app, "POST", "/sos/safe", Some(wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let right = json!({ "credential": { "kind": "pin", "pin": "4821" } });
    let (status, body) = call(&app, "POST", "/sos/safe", Some(right)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "IDLE");
  }

  #[tokio::test]
  async fn short_pin_is_rejected() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);
    let (status, _) = call(&app, "POST", "/settings/pin", Some(json!({ "pin": "12" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn wrong_disguise_code_is_unauthorized() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    let (_, mut settings) = call(&app, "GET", "/settings", None).await;
    settings["secret_mode"] = json!(true);
    let (status, _) = call(&app, "PUT", "/settings", Some(settings)).await;
    assert_eq!(status, StatusCode::OK);

    call(&app, "POST", "/sos?wait=true", Some(json!({ "kind": "button" }))).await;
    let (_, body) = call(&app, "POST", "/sos/safe", Some(json!({}))).await;
    assert_eq!(body["state"], "DISGUISED");

    let (status, _) = call(&app, "POST", "/disguise/unlock", Some(json!({ "input": "12+7" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = call(&app, "POST", "/disguise/unlock", Some(json!({ "input": "4x911" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "IDLE");
  }

  // ── Contacts ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn contacts_validate_and_freeze() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    let (_, list) = call(&app, "GET", "/contacts", None).await;
    assert_eq!(list[0]["contact_id"], SEED_CONTACT_ID.to_string());

    let dummy = json!({ "name": "Asha", "phone": "9999999999" });
    let (status, _) = call(&app, "POST", "/contacts", Some(dummy)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let ok = json!({ "name": "Asha", "phone": "98765 43210" });
    let (status, created) = call(&app, "POST", "/contacts", Some(ok)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["phone"], "+919876543210");

    let (status, _) = call(&app, "DELETE", &format!("/contacts/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    call(&app, "POST", "/sos?wait=true", Some(json!({ "kind": "button" }))).await;
    let late = json!({ "name": "Bala", "phone": "9876543211" });
    let (status, _) = call(&app, "POST", "/contacts", Some(late)).await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn signed_out_user_is_a_failed_precondition() {
    let fakes = FakePlatform::new();
    fakes.identity.sign_out();
    let app = app(&fakes);

    let (status, body) = call(&app, "GET", "/history", None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"], "no user is signed in");
  }

  #[tokio::test]
  async fn invalid_emergency_number_is_rejected() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    let (_, mut settings) = call(&app, "GET", "/settings", None).await;
    assert_eq!(settings["user_name"], "Asha");
    settings["emergency_number"] = json!("abc");
    let (status, _) = call(&app, "PUT", "/settings", Some(settings)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Sensors ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn armed_voice_phrase_triggers() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    let (_, body) = call(&app, "POST", "/sensors/transcript", Some(json!({ "transcript": "help me" }))).await;
    assert_eq!(body["phrase"], Value::Null, "not armed yet");

    let (_, armed) = call(&app, "POST", "/triggers/arm", None).await;
    assert_eq!(armed["voice"], "listening");

    let (_, body) = call(&app, "POST", "/sensors/transcript", Some(json!({ "transcript": "please help me" }))).await;
    assert_eq!(body["phrase"], "help me");

    settle().await;
    let (_, snapshot) = call(&app, "GET", "/status", None).await;
    assert_eq!(snapshot["state"], "EMERGENCY");
  }

  #[tokio::test]
  async fn permission_fault_disables_voice() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    call(&app, "POST", "/triggers/arm", None).await;
    let (_, body) = call(&app, "POST", "/sensors/voice/fault", Some(json!("not_allowed"))).await;
    assert_eq!(body["voice"], "disabled");
  }

  #[tokio::test]
  async fn network_reflects_the_probe() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    fakes.devices.probe.set(shield_core::network::ConnectivitySignal::offline());
    let (_, network) = call(&app, "POST", "/network/refresh", None).await;
    assert_eq!(network["online"], false);
    assert_eq!(network["preferred"], "GSM");

    let (_, network) = call(&app, "GET", "/network", None).await;
    assert_eq!(network["signal_level"], 0);
  }

  #[tokio::test]
  async fn observed_location_shows_in_status() {
    let fakes = FakePlatform::new();
    let app   = app(&fakes);

    let (status, _) = call(
      &app,
      "POST",
      "/location",
      Some(json!({ "latitude": 28.6139, "longitude": 77.209 })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, snapshot) = call(&app, "GET", "/status", None).await;
    assert_eq!(snapshot["last_location"]["latitude"], 28.6139);
  }
}
