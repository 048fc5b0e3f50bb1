//! In-process fakes for every platform port.

use std::{
  collections::HashSet,
  convert::Infallible,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use shield_core::{
  BoxError,
  contact::PhoneNumber,
  episode::{Episode, EvidenceKind, EvidenceRef},
  help::HelpResult,
  location::Location,
  network::ConnectivitySignal,
  ports::{
    AddressResolver, CloudMessenger, ConnectivityProbe, Dialer, EvidenceRecorder, HelpOracle,
    IdentityProvider, LocationProvider, LogUplink, MessageComposer, RecognizerFault, SirenDevice,
    SpeechRecognizer, SpeechSynth, ToneHandle, UserProfile,
  },
  store::{KvStore, MemoryStore},
};
use tokio::sync::watch;
use uuid::Uuid;

use crate::platform::Platform;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Let spawned tasks run until they block.
pub async fn settle() {
  for _ in 0..16 {
    tokio::task::yield_now().await;
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A [`MemoryStore`] that can hold back a single read until released.
pub struct ParkedStore {
  inner:  MemoryStore,
  parked: Mutex<Option<String>>,
  open:   watch::Sender<bool>,
}

impl Default for ParkedStore {
  fn default() -> Self {
    Self { inner: MemoryStore::new(), parked: Mutex::new(None), open: watch::channel(true).0 }
  }
}

impl ParkedStore {
  pub fn new() -> Self { Self::default() }

  /// The next read of `key` waits for [`release`](Self::release). Later
  /// reads pass straight through.
  pub fn park_next(&self, key: &str) {
    *lock(&self.parked) = Some(key.to_string());
    self.open.send_replace(false);
  }

  pub fn release(&self) { self.open.send_replace(true); }
}

impl KvStore for ParkedStore {
  type Error = Infallible;

  async fn get(&self, key: &str) -> Result<Option<String>, Infallible> {
    let parked = {
      let mut parked = lock(&self.parked);
      let hit = parked.as_deref() == Some(key);
      if hit {
        *parked = None;
      }
      hit
    };
    if parked {
      let mut open = self.open.subscribe();
      let _ = open.wait_for(|open| *open).await;
    }
    self.inner.get(key).await
  }

  async fn put(&self, key: &str, value: String) -> Result<(), Infallible> {
    self.inner.put(key, value).await
  }

  async fn delete(&self, key: &str) -> Result<(), Infallible> { self.inner.delete(key).await }
}

// ─── Native hand-offs ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeDialer {
  dialed: Mutex<Vec<String>>,
}

impl FakeDialer {
  pub fn dialed(&self) -> Vec<String> { lock(&self.dialed).clone() }
}

impl Dialer for FakeDialer {
  fn dial(&self, number: &PhoneNumber) { lock(&self.dialed).push(number.to_string()); }
}

#[derive(Default)]
pub struct FakeComposer {
  composed: Mutex<Vec<(String, String)>>,
}

impl FakeComposer {
  pub fn composed(&self) -> Vec<(String, String)> { lock(&self.composed).clone() }
}

impl MessageComposer for FakeComposer {
  fn compose(&self, phone: &PhoneNumber, body: &str) {
    lock(&self.composed).push((phone.to_string(), body.to_string()));
  }
}

#[derive(Default)]
pub struct FakeSiren {
  pub started: AtomicUsize,
  pub stopped: Arc<AtomicUsize>,
}

struct FakeTone(Arc<AtomicUsize>);

impl ToneHandle for FakeTone {
  fn stop(self: Box<Self>) { self.0.fetch_add(1, Ordering::SeqCst); }
}

impl SirenDevice for FakeSiren {
  fn start_tone(&self) -> Box<dyn ToneHandle> {
    self.started.fetch_add(1, Ordering::SeqCst);
    Box::new(FakeTone(self.stopped.clone()))
  }
}

#[derive(Default)]
pub struct FakeSpeech {
  spoken:      Mutex<Vec<String>>,
  pub cancels: AtomicUsize,
}

impl FakeSpeech {
  pub fn spoken(&self) -> Vec<String> { lock(&self.spoken).clone() }
}

impl SpeechSynth for FakeSpeech {
  fn speak(&self, text: &str) { lock(&self.spoken).push(text.to_string()); }

  fn cancel(&self) { self.cancels.fetch_add(1, Ordering::SeqCst); }
}

pub struct FakeProbe {
  signal: Mutex<ConnectivitySignal>,
}

impl FakeProbe {
  pub fn set(&self, signal: ConnectivitySignal) { *lock(&self.signal) = signal; }
}

impl ConnectivityProbe for FakeProbe {
  fn read(&self) -> ConnectivitySignal { lock(&self.signal).clone() }
}

/// The synchronous devices the actuator controller drives.
pub struct FakeDevices {
  pub dialer: Arc<FakeDialer>,
  pub siren:  Arc<FakeSiren>,
  pub speech: Arc<FakeSpeech>,
  pub probe:  Arc<FakeProbe>,
}

impl FakeDevices {
  pub fn online() -> Self {
    Self {
      dialer: Arc::default(),
      siren:  Arc::default(),
      speech: Arc::default(),
      probe:  Arc::new(FakeProbe { signal: Mutex::new(ConnectivitySignal::online()) }),
    }
  }
}

// ─── Async ports ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCloud {
  fail:    Mutex<HashSet<String>>,
  refuse:  Mutex<HashSet<String>>,
  delay:   Option<Duration>,
  sent:    Mutex<Vec<String>>,
}

impl FakeCloud {
  pub fn with_delay(delay: Duration) -> Self { Self { delay: Some(delay), ..Self::default() } }

  pub fn fail_for(&self, phone: &str) { lock(&self.fail).insert(phone.to_string()); }

  pub fn refuse_for(&self, phone: &str) { lock(&self.refuse).insert(phone.to_string()); }

  pub fn sent(&self) -> Vec<String> { lock(&self.sent).clone() }
}

#[async_trait]
impl CloudMessenger for FakeCloud {
  async fn send(&self, phone: &PhoneNumber, _body: &str) -> Result<bool, BoxError> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if lock(&self.fail).contains(phone.as_str()) {
      return Err("relay unreachable".into());
    }
    if lock(&self.refuse).contains(phone.as_str()) {
      return Ok(false);
    }
    lock(&self.sent).push(phone.to_string());
    Ok(true)
  }
}

#[derive(Default)]
pub struct FakeUplink {
  failing: AtomicBool,
  acked:   Mutex<Vec<Episode>>,
}

impl FakeUplink {
  pub fn set_failing(&self, failing: bool) { self.failing.store(failing, Ordering::SeqCst); }

  pub fn acked(&self) -> Vec<Uuid> { lock(&self.acked).iter().map(|e| e.episode_id).collect() }

  pub fn acked_episodes(&self) -> Vec<Episode> { lock(&self.acked).clone() }
}

#[async_trait]
impl LogUplink for FakeUplink {
  async fn acknowledge(&self, episode: &Episode) -> Result<(), BoxError> {
    if self.failing.load(Ordering::SeqCst) {
      return Err("uplink down".into());
    }
    lock(&self.acked).push(episode.clone());
    Ok(())
  }
}

enum Fix {
  Fixed(Location),
  Delayed(Location, Duration),
  Failing,
  Hanging,
}

pub struct FakeLocation {
  fix: Mutex<Fix>,
}

impl FakeLocation {
  pub fn fixed(location: Location) -> Self { Self { fix: Mutex::new(Fix::Fixed(location)) } }

  pub fn failing() -> Self { Self { fix: Mutex::new(Fix::Failing) } }

  pub fn hanging() -> Self { Self { fix: Mutex::new(Fix::Hanging) } }

  /// Answers with `location` once `delay` has passed.
  pub fn delayed(location: Location, delay: Duration) -> Self {
    Self { fix: Mutex::new(Fix::Delayed(location, delay)) }
  }

  /// Requests made from now on never answer.
  pub fn hang(&self) { *lock(&self.fix) = Fix::Hanging; }
}

#[async_trait]
impl LocationProvider for FakeLocation {
  async fn current_location(
    &self,
    _high_accuracy: bool,
    _timeout: Duration,
  ) -> Result<Location, BoxError> {
    let (outcome, delay) = match &*lock(&self.fix) {
      Fix::Fixed(l) => (Some(Ok(*l)), Duration::ZERO),
      Fix::Delayed(l, delay) => (Some(Ok(*l)), *delay),
      Fix::Failing => (Some(Err("no fix".into())), Duration::ZERO),
      Fix::Hanging => (None, Duration::ZERO),
    };
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    match outcome {
      Some(result) => result,
      None => std::future::pending().await,
    }
  }
}

pub struct FakeAddress {
  answer: Result<String, String>,
}

impl FakeAddress {
  pub fn ok(address: &str) -> Self { Self { answer: Ok(address.to_string()) } }

  pub fn failing() -> Self { Self { answer: Err("geocoder down".into()) } }
}

#[async_trait]
impl AddressResolver for FakeAddress {
  async fn resolve(&self, _latitude: f64, _longitude: f64) -> Result<String, BoxError> {
    self.answer.clone().map_err(Into::into)
  }
}

pub struct FakeHelp {
  answer:    Option<Vec<HelpResult>>,
  pub calls: AtomicUsize,
}

impl FakeHelp {
  pub fn returning(results: Vec<HelpResult>) -> Self {
    Self { answer: Some(results), calls: AtomicUsize::new(0) }
  }

  pub fn failing() -> Self { Self { answer: None, calls: AtomicUsize::new(0) } }
}

#[async_trait]
impl HelpOracle for FakeHelp {
  async fn find_nearby(&self, _latitude: f64, _longitude: f64) -> Result<Vec<HelpResult>, BoxError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.answer.clone().ok_or_else(|| "oracle down".into())
  }
}

#[derive(Default)]
pub struct FakeEvidence {
  pub started: AtomicUsize,
  pub stopped: AtomicUsize,
}

#[async_trait]
impl EvidenceRecorder for FakeEvidence {
  async fn start(&self, kind: EvidenceKind) -> Result<EvidenceRef, BoxError> {
    let n = self.started.fetch_add(1, Ordering::SeqCst);
    Ok(EvidenceRef { evidence_id: format!("rec-{n}"), kind, started_at: Utc::now() })
  }

  async fn stop(&self) { self.stopped.fetch_add(1, Ordering::SeqCst); }
}

pub struct FakeIdentity {
  user: Mutex<Option<UserProfile>>,
}

impl FakeIdentity {
  pub fn signed_in(user_id: &str, display_name: &str) -> Self {
    Self {
      user: Mutex::new(Some(UserProfile {
        user_id:      user_id.into(),
        display_name: display_name.into(),
      })),
    }
  }

  pub fn sign_out(&self) { *lock(&self.user) = None; }
}

impl IdentityProvider for FakeIdentity {
  fn current_user(&self) -> Option<UserProfile> { lock(&self.user).clone() }
}

#[derive(Default)]
pub struct FakeRecognizer {
  pub starts: AtomicUsize,
  pub aborts: AtomicUsize,
  next_fault: Mutex<Option<RecognizerFault>>,
}

impl FakeRecognizer {
  pub fn fail_next_start(&self, fault: RecognizerFault) { *lock(&self.next_fault) = Some(fault); }
}

impl SpeechRecognizer for FakeRecognizer {
  fn start(&self) -> Result<(), RecognizerFault> {
    self.starts.fetch_add(1, Ordering::SeqCst);
    match lock(&self.next_fault).take() {
      Some(fault) => Err(fault),
      None => Ok(()),
    }
  }

  fn abort(&self) { self.aborts.fetch_add(1, Ordering::SeqCst); }
}

// ─── Whole platform ──────────────────────────────────────────────────────────

/// Every fake, kept individually so tests can steer and inspect them.
pub struct FakePlatform {
  pub devices:    FakeDevices,
  pub identity:   Arc<FakeIdentity>,
  pub location:   Arc<FakeLocation>,
  pub address:    Arc<FakeAddress>,
  pub help:       Arc<FakeHelp>,
  pub cloud:      Arc<FakeCloud>,
  pub uplink:     Arc<FakeUplink>,
  pub evidence:   Arc<FakeEvidence>,
  pub composer:   Arc<FakeComposer>,
  pub recognizer: Arc<FakeRecognizer>,
}

impl Default for FakePlatform {
  fn default() -> Self { Self::new() }
}

impl FakePlatform {
  pub fn new() -> Self {
    Self {
      devices:    FakeDevices::online(),
      identity:   Arc::new(FakeIdentity::signed_in("u1", "Asha")),
      location:   Arc::new(FakeLocation::fixed(Location::new(12.9716, 77.5946))),
      address:    Arc::new(FakeAddress::ok("MG Road, Bengaluru")),
      help:       Arc::new(FakeHelp::returning(vec![HelpResult::OfficialMap {
        name: "Cubbon Park Police Station".into(),
        link: "https://maps.example/cubbon".into(),
      }])),
      cloud:      Arc::default(),
      uplink:     Arc::default(),
      evidence:   Arc::default(),
      composer:   Arc::default(),
      recognizer: Arc::default(),
    }
  }

  pub fn platform(&self) -> Platform {
    Platform {
      identity:     self.identity.clone(),
      location:     self.location.clone(),
      address:      self.address.clone(),
      help:         self.help.clone(),
      cloud:        self.cloud.clone(),
      uplink:       self.uplink.clone(),
      evidence:     self.evidence.clone(),
      dialer:       self.devices.dialer.clone(),
      composer:     self.composer.clone(),
      siren:        self.devices.siren.clone(),
      speech:       self.devices.speech.clone(),
      recognizer:   self.recognizer.clone(),
      connectivity: self.devices.probe.clone(),
    }
  }
}
