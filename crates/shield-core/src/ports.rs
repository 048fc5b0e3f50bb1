//! Platform capabilities the orchestrator depends on.
//!
//! Async ports use `async_trait` so they can be held as `Arc<dyn Trait>` and
//! swapped for fakes in tests. Fire-and-forget hand-offs to the native layer
//! (dialer, composer, siren, speech) are synchronous.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
  contact::PhoneNumber,
  episode::{Episode, EvidenceKind, EvidenceRef},
  error::BoxError,
  help::HelpResult,
  location::Location,
  network::ConnectivitySignal,
};

// ─── Identity ────────────────────────────────────────────────────────────────

/// The signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
  pub user_id:      String,
  pub display_name: String,
}

pub trait IdentityProvider: Send + Sync {
  /// `None` when nobody is signed in.
  fn current_user(&self) -> Option<UserProfile>;
}

// ─── Async lookups ───────────────────────────────────────────────────────────

#[async_trait]
pub trait LocationProvider: Send + Sync {
  /// Obtain a fresh fix. Implementations should honour `timeout` but callers
  /// bound the call independently.
  async fn current_location(
    &self,
    high_accuracy: bool,
    timeout: Duration,
  ) -> Result<Location, BoxError>;
}

#[async_trait]
pub trait AddressResolver: Send + Sync {
  async fn resolve(&self, latitude: f64, longitude: f64) -> Result<String, BoxError>;
}

#[async_trait]
pub trait HelpOracle: Send + Sync {
  async fn find_nearby(&self, latitude: f64, longitude: f64) -> Result<Vec<HelpResult>, BoxError>;
}

#[async_trait]
pub trait CloudMessenger: Send + Sync {
  /// Deliver `body` to `phone` over the data network. `Ok(false)` means the
  /// relay refused the message.
  async fn send(&self, phone: &PhoneNumber, body: &str) -> Result<bool, BoxError>;
}

#[async_trait]
pub trait LogUplink: Send + Sync {
  /// Push an episode to the remote record. `Ok` is the acknowledgment.
  async fn acknowledge(&self, episode: &Episode) -> Result<(), BoxError>;
}

#[async_trait]
pub trait EvidenceRecorder: Send + Sync {
  async fn start(&self, kind: EvidenceKind) -> Result<EvidenceRef, BoxError>;
  async fn stop(&self);
}

// ─── Native hand-offs ────────────────────────────────────────────────────────

pub trait Dialer: Send + Sync {
  /// Hand the number to the platform's direct-dial intent.
  fn dial(&self, number: &PhoneNumber);
}

pub trait MessageComposer: Send + Sync {
  /// Open the native SMS composer prefilled with `body`. No delivery report.
  fn compose(&self, phone: &PhoneNumber, body: &str);
}

/// A running siren tone. Dropping the box without calling `stop` leaks the
/// tone until the platform reclaims it.
pub trait ToneHandle: Send {
  fn stop(self: Box<Self>);
}

pub trait SirenDevice: Send + Sync {
  fn start_tone(&self) -> Box<dyn ToneHandle>;
}

pub trait SpeechSynth: Send + Sync {
  fn speak(&self, text: &str);
  /// Cancel any in-flight utterance.
  fn cancel(&self);
}

pub trait ConnectivityProbe: Send + Sync {
  fn read(&self) -> ConnectivitySignal;
}

// ─── Speech recognition ──────────────────────────────────────────────────────

/// Errors the platform recognizer can report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerFault {
  /// Microphone permission denied. Not recoverable without user action.
  NotAllowed,
  Aborted,
  NoSpeech,
  AudioCapture,
  Network,
  Other(String),
}

impl RecognizerFault {
  /// Whether the recognizer may be restarted after this fault.
  pub fn is_recoverable(&self) -> bool { !matches!(self, Self::NotAllowed) }

  /// Faults that happen routinely and are not worth a warning.
  pub fn is_routine(&self) -> bool {
    matches!(self, Self::Aborted | Self::NoSpeech | Self::AudioCapture)
  }
}

pub trait SpeechRecognizer: Send + Sync {
  /// Begin continuous recognition. Results and faults are delivered back to
  /// the voice guard by the embedding application.
  fn start(&self) -> Result<(), RecognizerFault>;
  fn abort(&self);
}
