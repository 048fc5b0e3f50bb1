//! Host stand-ins for the phone's native capabilities.
//!
//! On a host there is no dialer, siren, or microphone; these adapters record
//! each hand-off in the log so an operator can see what the device would do.

use std::{
  sync::{Mutex, PoisonError},
  time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use shield_core::{
  BoxError,
  contact::PhoneNumber,
  episode::{EvidenceKind, EvidenceRef},
  location::Location,
  network::ConnectivitySignal,
  ports::{
    ConnectivityProbe, Dialer, EvidenceRecorder, IdentityProvider, LocationProvider,
    MessageComposer, RecognizerFault, SirenDevice, SpeechRecognizer, SpeechSynth, ToneHandle,
    UserProfile,
  },
};
use tracing::{info, warn};
use uuid::Uuid;

// ─── Identity ─────────────────────────────────────────────────────────────────

/// The user named in the config file.
pub struct ConfiguredIdentity(Option<UserProfile>);

impl ConfiguredIdentity {
  pub fn new(user_id: &str, display_name: &str) -> Self {
    if user_id.is_empty() {
      return Self(None);
    }
    Self(Some(UserProfile { user_id: user_id.into(), display_name: display_name.into() }))
  }
}

impl IdentityProvider for ConfiguredIdentity {
  fn current_user(&self) -> Option<UserProfile> { self.0.clone() }
}

// ─── Hand-offs ────────────────────────────────────────────────────────────────

pub struct LoggingDialer;

impl Dialer for LoggingDialer {
  fn dial(&self, number: &PhoneNumber) { info!(%number, "dial"); }
}

pub struct LoggingComposer;

impl MessageComposer for LoggingComposer {
  fn compose(&self, phone: &PhoneNumber, body: &str) {
    info!(%phone, chars = body.chars().count(), "SMS composer opened");
  }
}

pub struct LoggingSiren;

struct LoggingTone;

impl ToneHandle for LoggingTone {
  fn stop(self: Box<Self>) { info!("siren off"); }
}

impl SirenDevice for LoggingSiren {
  fn start_tone(&self) -> Box<dyn ToneHandle> {
    info!("siren on");
    Box::new(LoggingTone)
  }
}

pub struct LoggingSpeech;

impl SpeechSynth for LoggingSpeech {
  fn speak(&self, text: &str) { info!(%text, "speak"); }

  fn cancel(&self) {}
}

/// Accepts every start; transcripts arrive through the API.
pub struct ExternalRecognizer;

impl SpeechRecognizer for ExternalRecognizer {
  fn start(&self) -> Result<(), RecognizerFault> {
    info!("recognizer started");
    Ok(())
  }

  fn abort(&self) { info!("recognizer aborted"); }
}

// ─── Sensors ──────────────────────────────────────────────────────────────────

/// Last connectivity reading, written by the reachability probe.
pub struct SharedConnectivity {
  signal: Mutex<ConnectivitySignal>,
}

impl SharedConnectivity {
  pub fn new(online: bool) -> Self {
    let signal = if online { ConnectivitySignal::online() } else { ConnectivitySignal::offline() };
    Self { signal: Mutex::new(signal) }
  }

  pub fn set(&self, signal: ConnectivitySignal) {
    *self.signal.lock().unwrap_or_else(PoisonError::into_inner) = signal;
  }
}

impl ConnectivityProbe for SharedConnectivity {
  fn read(&self) -> ConnectivitySignal {
    self.signal.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

/// A position from config. Hosts without one never get a fix, and the
/// orchestrator falls back to the last observed location.
pub struct FixedLocation(pub Option<Location>);

#[async_trait]
impl LocationProvider for FixedLocation {
  async fn current_location(
    &self,
    _high_accuracy: bool,
    _timeout: Duration,
  ) -> Result<Location, BoxError> {
    match self.0 {
      Some(location) => Ok(Location { fix_timestamp: Some(Utc::now()), ..location }),
      None => Err("no location source configured".into()),
    }
  }
}

/// Registers recordings without capturing anything.
#[derive(Default)]
pub struct LoggingRecorder {
  current: Mutex<Option<String>>,
}

#[async_trait]
impl EvidenceRecorder for LoggingRecorder {
  async fn start(&self, kind: EvidenceKind) -> Result<EvidenceRef, BoxError> {
    let evidence_id = Uuid::new_v4().to_string();
    info!(%evidence_id, ?kind, "evidence recording started");
    *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(evidence_id.clone());
    Ok(EvidenceRef { evidence_id, kind, started_at: Utc::now() })
  }

  async fn stop(&self) {
    match self.current.lock().unwrap_or_else(PoisonError::into_inner).take() {
      Some(evidence_id) => info!(%evidence_id, "evidence recording stopped"),
      None => warn!("stop requested with no recording in progress"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_user_id_means_signed_out() {
    assert!(ConfiguredIdentity::new("", "User").current_user().is_none());
    let user = ConfiguredIdentity::new("u1", "Asha").current_user().unwrap();
    assert_eq!(user.display_name, "Asha");
  }

  #[tokio::test]
  async fn fixed_location_is_stamped() {
    let loc = FixedLocation(Some(Location::new(12.97, 77.59)))
      .current_location(true, Duration::from_secs(5))
      .await
      .unwrap();
    assert_eq!(loc.latitude, 12.97);
    assert!(loc.fix_timestamp.is_some());

    assert!(FixedLocation(None).current_location(true, Duration::from_secs(5)).await.is_err());
  }

  #[test]
  fn shared_connectivity_reflects_last_write() {
    let probe = SharedConnectivity::new(true);
    assert!(probe.read().online);
    probe.set(ConnectivitySignal::offline());
    assert!(!probe.read().online);
  }
}
