//! HTTP adapters for the remote services: SMS relay, forensic uplink, place
//! search, and reverse geocoding.
//!
//! | Port | Request | Success |
//! |------|---------|---------|
//! | relay | `POST {relay_url}` `{"to":..,"body":..}` | 2xx; 4xx is a refusal |
//! | uplink | `POST {uplink_url}` episode JSON | 2xx |
//! | places | `GET {places_url}?lat=..&lng=..` | `[{"name":..,"link":..}]` |
//! | geocode | `GET {geocode_url}?lat=..&lng=..` | `{"address":..}` |

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use shield_core::{
  BoxError,
  contact::PhoneNumber,
  episode::Episode,
  help::HelpResult,
  network::ConnectivitySignal,
  ports::{AddressResolver, CloudMessenger, HelpOracle, LogUplink},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::device::SharedConnectivity;

/// Shared client and credentials. Cheap to clone.
#[derive(Clone)]
pub struct Remote {
  client:  Client,
  api_key: Option<String>,
}

impl Remote {
  pub fn new(timeout: Duration, api_key: Option<String>) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, api_key })
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    match &self.api_key {
      Some(key) => req.bearer_auth(key),
      None => req,
    }
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    url: &str,
    latitude: f64,
    longitude: f64,
  ) -> Result<T, BoxError> {
    let resp = self
      .auth(self.client.get(url))
      .query(&[("lat", latitude), ("lng", longitude)])
      .send()
      .await?
      .error_for_status()?;
    Ok(resp.json().await?)
  }
}

// ─── Relay ────────────────────────────────────────────────────────────────────

pub struct HttpRelay {
  remote: Remote,
  url:    String,
}

impl HttpRelay {
  pub fn new(remote: Remote, url: String) -> Self { Self { remote, url } }
}

#[async_trait]
impl CloudMessenger for HttpRelay {
  async fn send(&self, phone: &PhoneNumber, body: &str) -> Result<bool, BoxError> {
    let resp = self
      .remote
      .auth(self.remote.client.post(&self.url))
      .json(&json!({ "to": phone, "body": body }))
      .send()
      .await?;
    let status = resp.status();
    if status.is_client_error() {
      debug!(%status, "relay refused message");
      return Ok(false);
    }
    resp.error_for_status()?;
    Ok(true)
  }
}

// ─── Uplink ───────────────────────────────────────────────────────────────────

pub struct HttpUplink {
  remote: Remote,
  url:    String,
}

impl HttpUplink {
  pub fn new(remote: Remote, url: String) -> Self { Self { remote, url } }
}

#[async_trait]
impl LogUplink for HttpUplink {
  async fn acknowledge(&self, episode: &Episode) -> Result<(), BoxError> {
    self
      .remote
      .auth(self.remote.client.post(&self.url))
      .json(episode)
      .send()
      .await?
      .error_for_status()?;
    Ok(())
  }
}

// ─── Lookups ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Place {
  name: String,
  link: String,
}

pub struct HttpPlaces {
  remote: Remote,
  url:    String,
}

impl HttpPlaces {
  pub fn new(remote: Remote, url: String) -> Self { Self { remote, url } }
}

#[async_trait]
impl HelpOracle for HttpPlaces {
  async fn find_nearby(&self, latitude: f64, longitude: f64) -> Result<Vec<HelpResult>, BoxError> {
    let places: Vec<Place> = self.remote.get_json(&self.url, latitude, longitude).await?;
    Ok(
      places
        .into_iter()
        .map(|p| HelpResult::OfficialMap { name: p.name, link: p.link })
        .collect(),
    )
  }
}

#[derive(Deserialize)]
struct Geocoded {
  address: String,
}

pub struct HttpGeocoder {
  remote: Remote,
  url:    String,
}

impl HttpGeocoder {
  pub fn new(remote: Remote, url: String) -> Self { Self { remote, url } }
}

#[async_trait]
impl AddressResolver for HttpGeocoder {
  async fn resolve(&self, latitude: f64, longitude: f64) -> Result<String, BoxError> {
    let geocoded: Geocoded = self.remote.get_json(&self.url, latitude, longitude).await?;
    Ok(geocoded.address)
  }
}

// ─── Unconfigured ─────────────────────────────────────────────────────────────

/// Stands in for any remote service without an endpoint; every call fails,
/// which the dispatch layer treats like an unreachable service.
pub struct Unconfigured(pub &'static str);

impl Unconfigured {
  fn error(&self) -> BoxError { format!("{} endpoint not configured", self.0).into() }
}

#[async_trait]
impl CloudMessenger for Unconfigured {
  async fn send(&self, _phone: &PhoneNumber, _body: &str) -> Result<bool, BoxError> {
    Err(self.error())
  }
}

#[async_trait]
impl LogUplink for Unconfigured {
  async fn acknowledge(&self, _episode: &Episode) -> Result<(), BoxError> { Err(self.error()) }
}

#[async_trait]
impl HelpOracle for Unconfigured {
  async fn find_nearby(&self, _latitude: f64, _longitude: f64) -> Result<Vec<HelpResult>, BoxError> {
    Err(self.error())
  }
}

#[async_trait]
impl AddressResolver for Unconfigured {
  async fn resolve(&self, _latitude: f64, _longitude: f64) -> Result<String, BoxError> {
    Err(self.error())
  }
}

// ─── Reachability ─────────────────────────────────────────────────────────────

/// Poll `url` and record whether it answered. Any HTTP response counts as
/// online; only transport failures count as offline.
pub fn spawn_reachability_probe(
  remote: Remote,
  url: String,
  connectivity: Arc<SharedConnectivity>,
  every: Duration,
  cancel: CancellationToken,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut was_online = None;
    loop {
      let online = remote.client.head(&url).send().await.is_ok();
      if was_online != Some(online) {
        info!(online, %url, "relay reachability changed");
        was_online = Some(online);
      }
      connectivity.set(if online { ConnectivitySignal::online() } else { ConnectivitySignal::offline() });
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = tokio::time::sleep(every) => {}
      }
    }
    debug!("reachability probe stopped");
  })
}

#[cfg(test)]
mod tests {
  use axum::{Json, Router, http::StatusCode, routing::{get, post}};
  use serde_json::Value;
  use shield_core::contact::PhoneRules;
  use tokio::net::TcpListener;

  use super::*;

  async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
  }

  fn remote() -> Remote { Remote::new(Duration::from_secs(5), Some("k".into())).unwrap() }

  fn phone(raw: &str) -> PhoneNumber { PhoneNumber::parse(raw, &PhoneRules::default()).unwrap() }

  #[tokio::test]
  async fn relay_maps_statuses() {
    let app = Router::new()
      .route("/ok", post(|| async { StatusCode::ACCEPTED }))
      .route("/refuse", post(|| async { StatusCode::UNPROCESSABLE_ENTITY }))
      .route("/broken", post(|| async { StatusCode::BAD_GATEWAY }));
    let base = serve(app).await;
    let to = phone("9876543210");

    let ok = HttpRelay::new(remote(), format!("{base}/ok"));
    assert!(ok.send(&to, "help").await.unwrap());

    let refuse = HttpRelay::new(remote(), format!("{base}/refuse"));
    assert!(!refuse.send(&to, "help").await.unwrap());

    let broken = HttpRelay::new(remote(), format!("{base}/broken"));
    assert!(broken.send(&to, "help").await.is_err());
  }

  #[tokio::test]
  async fn relay_posts_number_and_body() {
    let app = Router::new().route(
      "/sms",
      post(|Json(v): Json<Value>| async move {
        if v["to"] == "+919876543210" && v["body"] == "help" {
          StatusCode::OK
        } else {
          StatusCode::BAD_REQUEST
        }
      }),
    );
    let base = serve(app).await;
    let relay = HttpRelay::new(remote(), format!("{base}/sms"));
    assert!(relay.send(&phone("9876543210"), "help").await.unwrap());
  }

  #[tokio::test]
  async fn places_become_official_map_results() {
    let app = Router::new().route(
      "/places",
      get(|| async {
        Json(serde_json::json!([{ "name": "Cubbon Park PS", "link": "https://maps.example/1" }]))
      }),
    );
    let base = serve(app).await;
    let places = HttpPlaces::new(remote(), format!("{base}/places"));

    let found = places.find_nearby(12.97, 77.59).await.unwrap();
    assert_eq!(
      found,
      vec![HelpResult::OfficialMap {
        name: "Cubbon Park PS".into(),
        link: "https://maps.example/1".into(),
      }]
    );
  }

  #[tokio::test]
  async fn geocoder_reads_address() {
    let app = Router::new().route(
      "/geo",
      get(|| async { Json(serde_json::json!({ "address": "MG Road, Bengaluru" })) }),
    );
    let base = serve(app).await;
    let geocoder = HttpGeocoder::new(remote(), format!("{base}/geo"));
    assert_eq!(geocoder.resolve(12.97, 77.59).await.unwrap(), "MG Road, Bengaluru");
  }

  #[tokio::test]
  async fn unconfigured_always_fails() {
    let relay = Unconfigured("relay");
    let err = relay.send(&phone("9876543210"), "help").await.unwrap_err();
    assert_eq!(err.to_string(), "relay endpoint not configured");
  }
}
