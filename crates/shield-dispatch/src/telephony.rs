//! Telephony and siren controller.
//!
//! [`Actuators`] owns the three long-lived side effects of an episode: the
//! siren tone, the repeating spoken distress announcement, and the
//! signal-recovery poll that places a deferred emergency call. Each is a
//! singleton: starting an already-running actuator is a no-op, and only
//! [`Actuators::stop_all`] (called on termination) tears them down.

use std::{
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use shield_core::{
  contact::PhoneNumber,
  location::Location,
  network::NetworkStatus,
  ports::{ConnectivityProbe, Dialer, SirenDevice, SpeechSynth, ToneHandle},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ActuatorConfig {
  /// How often the signal-recovery poll re-checks the network.
  pub signal_poll:  Duration,
  /// Gap between spoken distress announcements.
  pub voice_repeat: Duration,
}

impl Default for ActuatorConfig {
  fn default() -> Self {
    Self {
      signal_poll:  Duration::from_secs(4),
      voice_repeat: Duration::from_secs(15),
    }
  }
}

/// Text of the spoken distress announcement.
pub fn distress_announcement(location: Option<&Location>) -> String {
  let loc_text = match location {
    Some(l) => format!(
      "Coordinates: latitude {:.4}, longitude {:.4}.",
      l.latitude, l.longitude
    ),
    None => "GPS fixing...".to_string(),
  };
  format!("Emergency! She Shield SOS active. {loc_text}")
}

// ─── Handle ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ActuatorState {
  tone:         Option<Box<dyn ToneHandle>>,
  voice:        Option<CancellationToken>,
  /// Location read by the announcement loop on every repetition.
  announced:    Option<Location>,
  signal_watch: Option<CancellationToken>,
}

struct Inner {
  dialer: Arc<dyn Dialer>,
  siren:  Arc<dyn SirenDevice>,
  speech: Arc<dyn SpeechSynth>,
  probe:  Arc<dyn ConnectivityProbe>,
  config: ActuatorConfig,
  state:  Mutex<ActuatorState>,
}

impl Inner {
  fn state(&self) -> MutexGuard<'_, ActuatorState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn network(&self) -> NetworkStatus { NetworkStatus::classify(&self.probe.read()) }
}

/// Explicitly constructed actuator controller. Cloning shares the handle.
#[derive(Clone)]
pub struct Actuators {
  inner: Arc<Inner>,
}

impl Actuators {
  pub fn new(
    dialer: Arc<dyn Dialer>,
    siren: Arc<dyn SirenDevice>,
    speech: Arc<dyn SpeechSynth>,
    probe: Arc<dyn ConnectivityProbe>,
    config: ActuatorConfig,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        dialer,
        siren,
        speech,
        probe,
        config,
        state: Mutex::new(ActuatorState::default()),
      }),
    }
  }

  /// Classify the current connectivity reading.
  pub fn network_intelligence(&self) -> NetworkStatus { self.inner.network() }

  // ── Calls ─────────────────────────────────────────────────────────────

  /// Hand `number` to the platform dialer. Returns `false` without attempting
  /// anything when there is neither cellular signal nor a data connection.
  pub fn initiate_call(&self, number: &PhoneNumber) -> bool {
    let status = self.inner.network();
    if !status.can_dial() {
      warn!(%number, "no signal and offline; call not attempted");
      return false;
    }
    info!(%number, level = status.signal_level, "placing emergency call");
    self.inner.dialer.dial(number);
    true
  }

  /// Poll connectivity until a signal appears, then dial `number` once and
  /// invoke `on_recovered`. Returns `false` if a poll is already running.
  pub fn monitor_for_signal_and_call<F>(&self, number: PhoneNumber, on_recovered: F) -> bool
  where
    F: FnOnce(PhoneNumber) + Send + 'static,
  {
    let token = {
      let mut st = self.inner.state();
      if st.signal_watch.is_some() {
        debug!("signal-recovery poll already running");
        return false;
      }
      let token = CancellationToken::new();
      st.signal_watch = Some(token.clone());
      token
    };

    info!(%number, "waiting for signal to place deferred call");
    let inner = self.inner.clone();
    tokio::spawn(async move {
      loop {
        tokio::select! {
          _ = token.cancelled() => return,
          _ = tokio::time::sleep(inner.config.signal_poll) => {}
        }

        let level = inner.network().signal_level;
        debug!(level, "signal-recovery poll");
        if level == 0 {
          continue;
        }

        {
          let mut st = inner.state();
          if token.is_cancelled() {
            return;
          }
          st.signal_watch = None;
        }
        info!(%number, level, "signal recovered; placing deferred call");
        inner.dialer.dial(&number);
        on_recovered(number);
        return;
      }
    });
    true
  }

  pub fn stop_signal_monitoring(&self) {
    if let Some(token) = self.inner.state().signal_watch.take() {
      token.cancel();
      debug!("signal-recovery poll stopped");
    }
  }

  pub fn is_monitoring_signal(&self) -> bool { self.inner.state().signal_watch.is_some() }

  // ── Siren ─────────────────────────────────────────────────────────────

  /// Start the siren. Returns `false` if it is already sounding.
  pub fn start_siren(&self) -> bool {
    let mut st = self.inner.state();
    if st.tone.is_some() {
      return false;
    }
    st.tone = Some(self.inner.siren.start_tone());
    info!("siren started");
    true
  }

  /// Stop the siren and release the tone so the next start creates a new one.
  pub fn stop_siren(&self) {
    let tone = self.inner.state().tone.take();
    if let Some(tone) = tone {
      tone.stop();
      info!("siren stopped");
    }
  }

  pub fn is_siren_active(&self) -> bool { self.inner.state().tone.is_some() }

  // ── Distress voice ────────────────────────────────────────────────────

  /// Speak the distress announcement now and every `voice_repeat` after.
  /// Returns `false` if the loop is already running.
  pub fn start_distress_voice(&self, location: Option<Location>) -> bool {
    let token = {
      let mut st = self.inner.state();
      if st.voice.is_some() {
        return false;
      }
      let token = CancellationToken::new();
      st.voice = Some(token.clone());
      st.announced = location;
      token
    };

    let inner = self.inner.clone();
    tokio::spawn(async move {
      loop {
        let text = distress_announcement(inner.state().announced.as_ref());
        if token.is_cancelled() {
          return;
        }
        inner.speech.speak(&text);

        tokio::select! {
          _ = token.cancelled() => return,
          _ = tokio::time::sleep(inner.config.voice_repeat) => {}
        }
      }
    });
    info!("distress announcement started");
    true
  }

  /// Replace the location read by future announcements.
  pub fn update_announced_location(&self, location: Location) {
    self.inner.state().announced = Some(location);
  }

  /// Cancel the repeat timer and any utterance in progress.
  pub fn stop_distress_voice(&self) {
    let token = {
      let mut st = self.inner.state();
      st.announced = None;
      st.voice.take()
    };
    if let Some(token) = token {
      token.cancel();
      info!("distress announcement stopped");
    }
    self.inner.speech.cancel();
  }

  pub fn is_voice_active(&self) -> bool { self.inner.state().voice.is_some() }

  /// Tear down every actuator. Safe to call when nothing is running.
  pub fn stop_all(&self) {
    self.stop_siren();
    self.stop_distress_voice();
    self.stop_signal_monitoring();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use shield_core::network::ConnectivitySignal;
  use tokio::sync::oneshot;

  use super::*;
  use crate::testing::{FakeDevices, settle};

  fn actuators(dev: &FakeDevices) -> Actuators {
    Actuators::new(
      dev.dialer.clone(),
      dev.siren.clone(),
      dev.speech.clone(),
      dev.probe.clone(),
      ActuatorConfig::default(),
    )
  }

  fn emergency() -> PhoneNumber { PhoneNumber::service("112").unwrap() }

  #[tokio::test]
  async fn siren_start_is_idempotent() {
    let dev = FakeDevices::online();
    let act = actuators(&dev);

    assert!(act.start_siren());
    assert!(!act.start_siren());
    assert_eq!(dev.siren.started.load(Ordering::SeqCst), 1);

    act.stop_siren();
    assert_eq!(dev.siren.stopped.load(Ordering::SeqCst), 1);
    assert!(!act.is_siren_active());

    assert!(act.start_siren());
    assert_eq!(dev.siren.started.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn call_refused_without_any_signal() {
    let dev = FakeDevices::online();
    dev.probe.set(ConnectivitySignal::offline());
    let act = actuators(&dev);

    assert!(!act.initiate_call(&emergency()));
    assert!(dev.dialer.dialed().is_empty());

    dev.probe.set(ConnectivitySignal::online());
    assert!(act.initiate_call(&emergency()));
    assert_eq!(dev.dialer.dialed(), vec!["112".to_string()]);
  }

  #[tokio::test(start_paused = true)]
  async fn distress_voice_repeats_until_stopped() {
    let dev = FakeDevices::online();
    let act = actuators(&dev);

    assert!(act.start_distress_voice(None));
    assert!(!act.start_distress_voice(None));
    settle().await;
    assert_eq!(dev.speech.spoken().len(), 1);
    assert!(dev.speech.spoken()[0].ends_with("GPS fixing..."));

    act.update_announced_location(Location::new(12.97159, 77.59456));
    tokio::time::sleep(Duration::from_secs(15)).await;
    settle().await;
    let spoken = dev.speech.spoken();
    assert_eq!(spoken.len(), 2);
    assert!(spoken[1].contains("latitude 12.9716, longitude 77.5946"));

    act.stop_distress_voice();
    assert!(dev.speech.cancels.load(Ordering::SeqCst) >= 1);
    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(dev.speech.spoken().len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn signal_recovery_dials_once_when_signal_returns() {
    let dev = FakeDevices::online();
    dev.probe.set(ConnectivitySignal::offline());
    let act = actuators(&dev);
    let (tx, rx) = oneshot::channel();

    assert!(act.monitor_for_signal_and_call(emergency(), move |n| {
      let _ = tx.send(n);
    }));
    assert!(!act.monitor_for_signal_and_call(emergency(), |_| {}));

    tokio::time::sleep(Duration::from_secs(9)).await;
    settle().await;
    assert!(dev.dialer.dialed().is_empty());

    dev.probe.set(ConnectivitySignal::online());
    let recovered = rx.await.unwrap();
    assert_eq!(recovered.as_str(), "112");
    assert_eq!(dev.dialer.dialed().len(), 1);
    assert!(!act.is_monitoring_signal());
  }

  #[tokio::test(start_paused = true)]
  async fn stopping_signal_poll_prevents_the_call() {
    let dev = FakeDevices::online();
    dev.probe.set(ConnectivitySignal::offline());
    let act = actuators(&dev);

    act.monitor_for_signal_and_call(emergency(), |_| panic!("must not recover"));
    act.stop_all();
    dev.probe.set(ConnectivitySignal::online());

    tokio::time::sleep(Duration::from_secs(20)).await;
    settle().await;
    assert!(dev.dialer.dialed().is_empty());
  }
}
