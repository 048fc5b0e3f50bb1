//! The SOS dispatch orchestrator.
//!
//! Sequences the actuators, location, alert fan-out, forensic log and help
//! search into one emergency episode, and owns the only path that ends it.
//!
//! Activation is guarded twice: a ticketed re-entrancy lock rejects a second
//! trigger while one is in flight, and the published [`AppState`] rejects a
//! trigger while an emergency is already active. The lock is released by a
//! drop guard on every exit path. Each activation also bumps a session
//! generation so that work still in flight after "I am safe" cannot write
//! into the next episode's observable state.

use std::{
  sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
  },
  time::{Duration, Instant},
};

use serde::Serialize;
use shield_core::{
  contact::{Contact, ContactBook, NewContact, PhoneNumber, PhoneRules},
  episode::{ContactOutcome, Episode, EvidenceKind, EvidenceRef, NewEpisode},
  help::HelpResult,
  location::{LOCATING, Location, map_link_or_placeholder},
  message::{CALL_INITIATED, compose_alert},
  network::{NetworkStatus, Transport},
  ports::{EvidenceRecorder, IdentityProvider, UserProfile},
  settings::{DEFAULT_EMERGENCY_NUMBER, UserSettings},
  store::KvStore,
};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  auth::{Credential, PinVault},
  contacts::ContactRegistry,
  dispatcher::{ContactDispatcher, ContactProgress, ProgressBoard},
  forensic::{ForensicLogger, HISTORY_CAP},
  help::NearbyHelp,
  locate::{Locator, LocatorConfig},
  monitor::ConnectivityMonitor,
  platform::Platform,
  settings::SettingsRepo,
  telephony::{ActuatorConfig, Actuators},
  triggers::{Acceleration, PhraseMatcher, ShakeConfig, ShakeDetector, TriggerSource, DEFAULT_PHRASES},
  voice::{GuardState, VoiceGuard, VoiceGuardConfig},
};

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
  pub actuators:         ActuatorConfig,
  pub locator:           LocatorConfig,
  pub voice:             VoiceGuardConfig,
  pub shake:             ShakeConfig,
  pub phone_rules:       PhoneRules,
  pub history_cap:       usize,
  pub connectivity_poll: Duration,
  /// Longest an activation waits for stored settings before dialing with
  /// the defaults.
  pub settings_timeout:  Duration,
  pub trigger_phrases:   Vec<String>,
  /// Digits that, typed at the end of the disguise calculator, leave it.
  pub disguise_code:     String,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      actuators:         ActuatorConfig::default(),
      locator:           LocatorConfig::default(),
      voice:             VoiceGuardConfig::default(),
      shake:             ShakeConfig::default(),
      phone_rules:       PhoneRules::default(),
      history_cap:       HISTORY_CAP,
      connectivity_poll: Duration::from_secs(5),
      settings_timeout:  Duration::from_millis(750),
      trigger_phrases:   DEFAULT_PHRASES.iter().map(|p| p.to_string()).collect(),
      disguise_code:     "911".into(),
    }
  }
}

// ─── Public types ────────────────────────────────────────────────────────────

/// Process-wide application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
  Idle,
  Emergency,
  /// The app is showing its decoy screen.
  Disguised,
}

/// Summary of a completed activation.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeReport {
  pub source:      TriggerSource,
  pub call_placed: bool,
  pub location:    Option<Location>,
  pub address:     String,
  pub transport:   Transport,
  pub outcomes:    Vec<ContactOutcome>,
  /// Absent when no location was ever obtained.
  pub episode:     Option<Episode>,
  pub help:        Vec<HelpResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
  /// An emergency was already active or being triggered.
  Ignored,
  /// "I am safe" arrived before the call could be placed.
  Interrupted,
  Activated(Box<EpisodeReport>),
}

/// Everything a presentation layer needs to render the current state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
  pub state:           AppState,
  pub call_active:     bool,
  pub siren_active:    bool,
  pub voice_active:    bool,
  pub awaiting_signal: bool,
  pub contacts:        Vec<ContactProgress>,
  pub help:            Vec<HelpResult>,
  pub searching_help:  bool,
  /// Emergency is active but nearby help cannot be searched.
  pub help_offline:    bool,
  pub last_location:   Option<Location>,
  pub network:         NetworkStatus,
  pub voice_trigger:   GuardState,
}

// ─── Internals ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct LoggedEpisode {
  user_id:    String,
  episode_id: Uuid,
}

/// Observable state of the current episode.
#[derive(Default)]
struct Session {
  generation:      u64,
  board:           ProgressBoard,
  help:            Vec<HelpResult>,
  searching_help:  bool,
  call_active:     bool,
  dialed:          Vec<PhoneNumber>,
  logged:          Option<LoggedEpisode>,
  evidence_active: bool,
}

impl Session {
  fn new(generation: u64) -> Self { Self { generation, ..Self::default() } }
}

/// Held for the duration of one `trigger_sos` call.
struct TriggerLock<'a> {
  holder: &'a AtomicU64,
  ticket: u64,
}

impl<'a> TriggerLock<'a> {
  fn acquire(holder: &'a AtomicU64, tickets: &AtomicU64) -> Option<Self> {
    let ticket = tickets.fetch_add(1, Ordering::SeqCst) + 1;
    holder
      .compare_exchange(0, ticket, Ordering::SeqCst, Ordering::SeqCst)
      .ok()
      .map(|_| Self { holder, ticket })
  }
}

impl Drop for TriggerLock<'_> {
  fn drop(&mut self) {
    // A no-op if termination already cleared the lock.
    let _ = self
      .holder
      .compare_exchange(self.ticket, 0, Ordering::SeqCst, Ordering::SeqCst);
  }
}

struct Inner<S> {
  identity:   Arc<dyn IdentityProvider>,
  evidence:   Arc<dyn EvidenceRecorder>,
  actuators:  Actuators,
  dispatcher: ContactDispatcher,
  logger:     Arc<ForensicLogger<S>>,
  locator:    Locator,
  help:       NearbyHelp,
  contacts:   ContactRegistry<S>,
  settings:   SettingsRepo<S>,
  vault:      PinVault<S>,
  monitor:    Arc<ConnectivityMonitor<S>>,
  voice:      VoiceGuard,
  shake:      Mutex<ShakeDetector>,
  config:     OrchestratorConfig,
  state:      watch::Sender<AppState>,
  trigger:    AtomicU64,
  tickets:    AtomicU64,
  session:    Mutex<Session>,
}

impl<S> Inner<S> {
  fn session(&self) -> MutexGuard<'_, Session> {
    self.session.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn is_current(&self, generation: u64) -> bool { self.session().generation == generation }
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// Cloning shares the same orchestrator.
pub struct Orchestrator<S> {
  inner: Arc<Inner<S>>,
}

impl<S> Clone for Orchestrator<S> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<S> Orchestrator<S>
where
  S: KvStore + 'static,
{
  pub fn new(store: Arc<S>, platform: Platform, config: OrchestratorConfig) -> Self {
    let actuators = Actuators::new(
      platform.dialer,
      platform.siren,
      platform.speech,
      platform.connectivity,
      config.actuators.clone(),
    );
    let logger = Arc::new(ForensicLogger::new(
      store.clone(),
      platform.uplink,
      config.history_cap,
    ));
    let monitor = Arc::new(ConnectivityMonitor::new(
      actuators.clone(),
      logger.clone(),
      platform.identity.clone(),
    ));
    let voice = VoiceGuard::new(
      platform.recognizer,
      PhraseMatcher::new(&config.trigger_phrases),
      config.voice.clone(),
    );
    let (state, _) = watch::channel(AppState::Idle);

    Self {
      inner: Arc::new(Inner {
        identity: platform.identity,
        evidence: platform.evidence,
        dispatcher: ContactDispatcher::new(platform.cloud, platform.composer),
        locator: Locator::new(platform.location, platform.address, config.locator.clone()),
        help: NearbyHelp::new(platform.help),
        contacts: ContactRegistry::new(store.clone(), config.phone_rules.clone()),
        settings: SettingsRepo::new(store.clone()),
        vault: PinVault::new(store),
        shake: Mutex::new(ShakeDetector::new(config.shake.clone())),
        actuators,
        logger,
        monitor,
        voice,
        config,
        state,
        trigger: AtomicU64::new(0),
        tickets: AtomicU64::new(0),
        session: Mutex::new(Session::default()),
      }),
    }
  }

  pub fn state(&self) -> AppState { *self.inner.state.borrow() }

  pub fn subscribe_state(&self) -> watch::Receiver<AppState> { self.inner.state.subscribe() }

  fn profile(&self) -> Result<UserProfile> {
    self.inner.identity.current_user().ok_or(Error::NoCurrentUser)
  }

  /// An emergency is active or a trigger is still in flight.
  fn is_active(&self) -> bool {
    self.state() == AppState::Emergency || self.inner.trigger.load(Ordering::SeqCst) != 0
  }

  async fn settings_or_default(&self, profile: &UserProfile) -> UserSettings {
    match self.inner.settings.load(profile).await {
      Ok(s) => s,
      Err(e) => {
        warn!(error = %e, "settings unavailable; using defaults");
        UserSettings { user_name: profile.display_name.clone(), ..UserSettings::default() }
      }
    }
  }

  async fn settings_for_dispatch(&self, profile: &UserProfile) -> UserSettings {
    let read = self.settings_or_default(profile);
    match tokio::time::timeout(self.inner.config.settings_timeout, read).await {
      Ok(settings) => settings,
      Err(_) => {
        warn!("settings read stalled; dialing with defaults");
        UserSettings { user_name: profile.display_name.clone(), ..UserSettings::default() }
      }
    }
  }

  // ── Activation ────────────────────────────────────────────────────────

  /// Run one emergency episode. A call while an emergency is active or a
  /// trigger is in flight is a silent no-op. Returns once the fan-out, the
  /// forensic write, and the help search have settled; the app stays in
  /// [`AppState::Emergency`] until [`stop_sos`](Self::stop_sos).
  pub async fn trigger_sos(&self, source: TriggerSource) -> Result<TriggerOutcome> {
    let inner = &*self.inner;
    let Some(_lock) = TriggerLock::acquire(&inner.trigger, &inner.tickets) else {
      debug!(?source, "trigger already in flight; ignored");
      return Ok(TriggerOutcome::Ignored);
    };
    if self.state() == AppState::Emergency {
      debug!(?source, "emergency already active; ignored");
      return Ok(TriggerOutcome::Ignored);
    }
    let profile = self.profile()?;

    // The board belongs to this episode; termination swaps in a fresh one.
    let (generation, board) = {
      let mut session = inner.session();
      let generation = session.generation + 1;
      *session = Session::new(generation);
      (generation, session.board.clone())
    };
    inner.state.send_replace(AppState::Emergency);
    info!(?source, user_id = %profile.user_id, "SOS activated");

    let network = inner.monitor.observe();
    inner.actuators.start_siren();
    inner.actuators.start_distress_voice(inner.locator.last_known());

    let settings = self.settings_for_dispatch(&profile).await;
    if !inner.is_current(generation) {
      info!("SOS ended before the call was placed");
      return Ok(TriggerOutcome::Interrupted);
    }

    // The call never waits on location.
    let number = PhoneNumber::service(&settings.emergency_number)
      .or_else(|_| PhoneNumber::service(DEFAULT_EMERGENCY_NUMBER))?;
    let call_placed = inner.actuators.initiate_call(&number);
    let mut dialed = Vec::new();
    if call_placed {
      dialed.push(number.clone());
      let mut session = inner.session();
      session.call_active = true;
      session.dialed.push(number);
    } else {
      let this = self.clone();
      inner.actuators.monitor_for_signal_and_call(number, move |recovered| {
        tokio::spawn(async move { this.record_recovered_call(generation, recovered).await });
      });
      debug!(signal_level = network.signal_level, "call deferred until signal returns");
    }

    let (location, evidence) = tokio::join!(
      inner.locator.locate(),
      self.start_evidence(&settings, generation)
    );
    if let Some(loc) = location.filter(|_| inner.is_current(generation)) {
      inner.actuators.update_announced_location(loc);
    }

    let address = match &location {
      Some(loc) => inner.locator.resolve_address(loc).await,
      None => LOCATING.to_string(),
    };
    let message = compose_alert(
      &settings.sms_template,
      &settings.user_name,
      CALL_INITIATED,
      &address,
      &map_link_or_placeholder(location.as_ref()),
    );

    let contacts: Vec<Contact> = match inner.contacts.snapshot(&profile.user_id).await {
      Ok(book) => book.contacts().to_vec(),
      Err(e) => {
        warn!(error = %e, "contacts unavailable; no alerts sent");
        Vec::new()
      }
    };
    let transport = inner.monitor.observe().preferred;
    let outcomes = inner
      .dispatcher
      .dispatch_all(&contacts, &message, transport, &board)
      .await;

    let online = inner.monitor.observe().online;
    let episode = match location {
      Some(loc) => {
        let new = NewEpisode {
          user_id: profile.user_id.clone(),
          user_name: settings.user_name.clone(),
          location: loc,
          address: address.clone(),
          dialed_numbers: dialed,
          contact_outcomes: outcomes.clone(),
          evidence,
        };
        self.write_episode(generation, new, online).await
      }
      None => {
        warn!("no location obtained; episode not logged");
        None
      }
    };

    let help = match location {
      Some(loc) if online => self.search_help(generation, &loc).await,
      _ => Vec::new(),
    };

    info!(call_placed, ?transport, logged = episode.is_some(), "SOS dispatch settled");
    Ok(TriggerOutcome::Activated(Box::new(EpisodeReport {
      source,
      call_placed,
      location,
      address,
      transport,
      outcomes,
      episode,
      help,
    })))
  }

  /// Run [`trigger_sos`](Self::trigger_sos) on its own task so it outlives
  /// the caller (e.g. a dropped HTTP request).
  pub fn spawn_trigger(&self, source: TriggerSource) -> JoinHandle<Result<TriggerOutcome>> {
    let this = self.clone();
    tokio::spawn(async move { this.trigger_sos(source).await })
  }

  async fn start_evidence(&self, settings: &UserSettings, generation: u64) -> Option<EvidenceRef> {
    if !settings.auto_record() {
      return None;
    }
    let kind = match (settings.auto_record_audio, settings.auto_record_video) {
      (true, true) => EvidenceKind::AudioVideo,
      (false, true) => EvidenceKind::Video,
      _ => EvidenceKind::Audio,
    };

    let evidence = match self.inner.evidence.start(kind).await {
      Ok(r) => r,
      Err(e) => {
        warn!(error = %e, "evidence recording failed to start");
        return None;
      }
    };

    let current = {
      let mut session = self.inner.session();
      let current = session.generation == generation;
      if current {
        session.evidence_active = true;
      }
      current
    };
    if !current {
      self.inner.evidence.stop().await;
      return None;
    }
    info!(evidence_id = %evidence.evidence_id, ?kind, "evidence recording started");
    Some(evidence)
  }

  /// Write the forensic entry, then catch up on any deferred call that was
  /// placed while the write was in progress.
  async fn write_episode(&self, generation: u64, mut new: NewEpisode, online: bool) -> Option<Episode> {
    let logged_len = {
      let session = self.inner.session();
      if session.generation == generation {
        new.dialed_numbers = session.dialed.clone();
      }
      new.dialed_numbers.len()
    };

    let episode = match self.inner.logger.log_episode(new, online).await {
      Ok(ep) => ep,
      Err(e) => {
        warn!(error = %e, "forensic write failed");
        return None;
      }
    };

    let missed = {
      let mut session = self.inner.session();
      if session.generation != generation {
        Vec::new()
      } else {
        session.logged = Some(LoggedEpisode {
          user_id:    episode.user_id.clone(),
          episode_id: episode.episode_id,
        });
        session.dialed.get(logged_len..).map(<[_]>::to_vec).unwrap_or_default()
      }
    };
    for number in missed {
      if let Err(e) = self
        .inner
        .logger
        .append_dialed(&episode.user_id, episode.episode_id, number)
        .await
      {
        warn!(error = %e, "could not record deferred call");
      }
    }
    Some(episode)
  }

  async fn record_recovered_call(&self, generation: u64, number: PhoneNumber) {
    let logged = {
      let mut session = self.inner.session();
      if session.generation != generation {
        return;
      }
      session.call_active = true;
      session.dialed.push(number.clone());
      session.logged.clone()
    };
    info!(%number, "deferred emergency call placed");

    if let Some(logged) = logged {
      if let Err(e) = self
        .inner
        .logger
        .append_dialed(&logged.user_id, logged.episode_id, number)
        .await
      {
        warn!(error = %e, "could not record deferred call");
      }
    }
  }

  async fn search_help(&self, generation: u64, location: &Location) -> Vec<HelpResult> {
    {
      let mut session = self.inner.session();
      if session.generation != generation {
        return Vec::new();
      }
      session.searching_help = true;
    }
    let results = self.inner.help.search(location).await;
    let mut session = self.inner.session();
    if session.generation == generation {
      session.searching_help = false;
      session.help = results.clone();
    }
    results
  }

  // ── Termination ───────────────────────────────────────────────────────

  /// End the emergency. Requires authentication when a PIN is configured;
  /// authentication failure is the only hard error. Sends already in flight
  /// are not cancelled. Returns the state entered; a no-op outside an
  /// emergency.
  pub async fn stop_sos(&self, credential: Option<Credential>) -> Result<AppState> {
    let current = self.state();
    if current != AppState::Emergency {
      return Ok(current);
    }
    let profile = self.profile()?;
    let settings = self.settings_or_default(&profile).await;
    self
      .inner
      .vault
      .authenticate(&profile.user_id, credential.as_ref(), settings.biometric_enabled)
      .await?;

    let next = if settings.secret_mode { AppState::Disguised } else { AppState::Idle };

    self.inner.actuators.stop_all();
    let had_evidence = {
      let mut session = self.inner.session();
      let had = session.evidence_active;
      let generation = session.generation + 1;
      *session = Session::new(generation);
      had
    };
    self.inner.trigger.store(0, Ordering::SeqCst);
    if had_evidence {
      self.inner.evidence.stop().await;
    }

    self.inner.state.send_replace(next);
    info!(?next, "SOS ended; user marked safe");
    Ok(next)
  }

  /// Leave the decoy screen. `input` is what was typed into it; it unlocks
  /// when it ends with the configured code.
  pub fn leave_disguise(&self, input: &str) -> Result<AppState> {
    let current = self.state();
    if current != AppState::Disguised {
      return Ok(current);
    }
    if !input.ends_with(&self.inner.config.disguise_code) {
      return Err(Error::AuthenticationFailed);
    }
    self.inner.state.send_replace(AppState::Idle);
    info!("left disguise");
    Ok(AppState::Idle)
  }

  // ── Observation ───────────────────────────────────────────────────────

  pub fn status(&self) -> StatusSnapshot {
    let state = self.state();
    let network = self.inner.monitor.current();
    let session = self.inner.session();
    StatusSnapshot {
      state,
      call_active: session.call_active,
      siren_active: self.inner.actuators.is_siren_active(),
      voice_active: self.inner.actuators.is_voice_active(),
      awaiting_signal: self.inner.actuators.is_monitoring_signal(),
      contacts: session.board.snapshot(),
      help: session.help.clone(),
      searching_help: session.searching_help,
      help_offline: state == AppState::Emergency && !network.online,
      last_location: self.inner.locator.last_known(),
      network,
      voice_trigger: self.inner.voice.state(),
    }
  }

  pub fn network(&self) -> NetworkStatus { self.inner.monitor.current() }

  /// Re-evaluate connectivity now and flush pending episodes if online.
  pub async fn refresh_network(&self) -> NetworkStatus { self.inner.monitor.refresh().await }

  pub fn subscribe_network(&self) -> watch::Receiver<NetworkStatus> { self.inner.monitor.subscribe() }

  pub fn spawn_connectivity_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
    self
      .inner
      .monitor
      .clone()
      .spawn(self.inner.config.connectivity_poll, cancel)
  }

  /// Feed a passively observed position.
  pub fn observe_location(&self, location: Location) { self.inner.locator.remember(location); }

  // ── Trigger sources ───────────────────────────────────────────────────

  /// Arm the voice trigger if the signed-in user has it enabled.
  pub async fn arm_triggers(&self) -> Result<GuardState> {
    let profile = self.profile()?;
    let settings = self.settings_or_default(&profile).await;
    if settings.voice_trigger {
      Ok(self.inner.voice.arm())
    } else {
      self.inner.voice.disarm();
      Ok(self.inner.voice.state())
    }
  }

  pub fn voice_guard(&self) -> &VoiceGuard { &self.inner.voice }

  /// Feed one accelerometer sample. Returns whether it completed a shake
  /// gesture, in which case an activation has been spawned.
  pub async fn observe_motion(&self, sample: Acceleration) -> Result<bool> {
    let profile = self.profile()?;
    if !self.settings_or_default(&profile).await.shake_trigger {
      return Ok(false);
    }
    let fired = self
      .inner
      .shake
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .observe(sample, Instant::now());
    if fired {
      self.spawn_trigger(TriggerSource::Shake);
    }
    Ok(fired)
  }

  /// Feed a recognizer transcript. Returns the matched phrase, in which case
  /// an activation has been spawned.
  pub fn observe_transcript(&self, transcript: &str) -> Option<String> {
    let phrase = self.inner.voice.on_transcript(transcript)?;
    self.spawn_trigger(TriggerSource::Voice { phrase: phrase.clone() });
    Some(phrase)
  }

  // ── User data ─────────────────────────────────────────────────────────

  pub async fn contacts(&self) -> Result<ContactBook> {
    let profile = self.profile()?;
    self.inner.contacts.list(&profile.user_id).await
  }

  pub async fn add_contact(&self, input: NewContact) -> Result<Contact> {
    let profile = self.profile()?;
    self
      .inner
      .contacts
      .add(&profile.user_id, input, || self.is_active())
      .await
  }

  pub async fn remove_contact(&self, contact_id: Uuid) -> Result<Contact> {
    let profile = self.profile()?;
    self
      .inner
      .contacts
      .remove(&profile.user_id, contact_id, || self.is_active())
      .await
  }

  /// The signed-in user's episodes, most recent first.
  pub async fn history(&self) -> Result<Vec<Episode>> {
    let profile = self.profile()?;
    self.inner.logger.history(&profile.user_id).await
  }

  pub async fn sync_pending(&self) -> Result<usize> {
    let profile = self.profile()?;
    self.inner.logger.sync_pending_logs(&profile.user_id).await
  }

  pub async fn settings(&self) -> Result<UserSettings> {
    let profile = self.profile()?;
    self.inner.settings.load(&profile).await
  }

  /// Persist settings and re-arm triggers to match.
  pub async fn update_settings(&self, settings: UserSettings) -> Result<UserSettings> {
    let profile = self.profile()?;
    PhoneNumber::service(&settings.emergency_number)?;
    self.inner.settings.save(&profile.user_id, &settings).await?;
    if settings.voice_trigger {
      self.inner.voice.arm();
    } else {
      self.inner.voice.disarm();
    }
    info!(user_id = %profile.user_id, "settings updated");
    Ok(settings)
  }

  pub async fn set_pin(&self, pin: &str) -> Result<()> {
    let profile = self.profile()?;
    self.inner.vault.set_pin(&profile.user_id, pin).await
  }

  pub async fn has_pin(&self) -> Result<bool> {
    let profile = self.profile()?;
    self.inner.vault.has_pin(&profile.user_id).await
  }
}
