//! Lifecycle of the always-on voice trigger.
//!
//! Platform recognizers stop on their own (silence, audio glitches, OS
//! interruptions). [`VoiceGuard`] restarts them after a cooldown, gives up
//! permanently when microphone permission is denied, and only forwards
//! transcripts while actually listening.
//!
//! ```text
//!  Idle ──arm──▶ Starting ──ok──▶ Listening
//!                  ▲   │               │ end / recoverable fault
//!                  │   └──fault──┐     ▼
//!                  └──timer──── CoolingDown
//!  any ──permission denied──▶ Disabled
//! ```

use std::{
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use serde::Serialize;
use shield_core::ports::{RecognizerFault, SpeechRecognizer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::triggers::PhraseMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
  Idle,
  Starting,
  Listening,
  CoolingDown,
  /// Permission denied; stays here until the process restarts.
  Disabled,
}

#[derive(Debug, Clone)]
pub struct VoiceGuardConfig {
  /// Delay before restarting a recognizer that stopped.
  pub cooldown: Duration,
}

impl Default for VoiceGuardConfig {
  fn default() -> Self { Self { cooldown: Duration::from_secs(2) } }
}

struct Core {
  state:   GuardState,
  /// Cancelled on disarm; owns every timer of the arming session.
  session: Option<CancellationToken>,
}

struct Inner {
  recognizer: Arc<dyn SpeechRecognizer>,
  matcher:    PhraseMatcher,
  config:     VoiceGuardConfig,
  core:       Mutex<Core>,
}

impl Inner {
  fn core(&self) -> MutexGuard<'_, Core> { self.core.lock().unwrap_or_else(PoisonError::into_inner) }
}

#[derive(Clone)]
pub struct VoiceGuard {
  inner: Arc<Inner>,
}

impl VoiceGuard {
  pub fn new(
    recognizer: Arc<dyn SpeechRecognizer>,
    matcher: PhraseMatcher,
    config: VoiceGuardConfig,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        recognizer,
        matcher,
        config,
        core: Mutex::new(Core { state: GuardState::Idle, session: None }),
      }),
    }
  }

  pub fn state(&self) -> GuardState { self.inner.core().state }

  /// Begin listening. No effect unless idle.
  pub fn arm(&self) -> GuardState {
    {
      let mut core = self.inner.core();
      if core.state != GuardState::Idle {
        return core.state;
      }
      core.state = GuardState::Starting;
      core.session = Some(CancellationToken::new());
    }
    info!("voice trigger armed");
    self.start_recognizer();
    self.state()
  }

  /// Stop listening and cancel any pending restart.
  pub fn disarm(&self) {
    {
      let mut core = self.inner.core();
      if matches!(core.state, GuardState::Idle | GuardState::Disabled) {
        return;
      }
      if let Some(session) = core.session.take() {
        session.cancel();
      }
      core.state = GuardState::Idle;
    }
    self.inner.recognizer.abort();
    info!("voice trigger disarmed");
  }

  /// A transcript from the recognizer. Returns the matched trigger phrase.
  pub fn on_transcript(&self, transcript: &str) -> Option<String> {
    if self.state() != GuardState::Listening {
      return None;
    }
    let phrase = self.inner.matcher.find(transcript)?;
    info!(%phrase, "voice trigger phrase heard");
    Some(phrase)
  }

  /// The recognizer reported a fault.
  pub fn on_fault(&self, fault: RecognizerFault) {
    if !fault.is_recoverable() {
      {
        let mut core = self.inner.core();
        if let Some(session) = core.session.take() {
          session.cancel();
        }
        core.state = GuardState::Disabled;
      }
      self.inner.recognizer.abort();
      warn!("microphone permission denied; voice trigger disabled");
      return;
    }

    if fault.is_routine() {
      debug!(?fault, "recognizer stopped");
    } else {
      warn!(?fault, "recognizer fault");
    }
    self.on_end();
  }

  /// The recognizer session ended. Schedules exactly one restart.
  pub fn on_end(&self) {
    let timer = {
      let mut core = self.inner.core();
      if !matches!(core.state, GuardState::Listening | GuardState::Starting) {
        return;
      }
      let Some(session) = core.session.as_ref() else {
        return;
      };
      let timer = session.child_token();
      core.state = GuardState::CoolingDown;
      timer
    };

    let guard = self.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = timer.cancelled() => return,
        _ = tokio::time::sleep(guard.inner.config.cooldown) => {}
      }
      {
        let mut core = guard.inner.core();
        if timer.is_cancelled() || core.state != GuardState::CoolingDown {
          return;
        }
        core.state = GuardState::Starting;
      }
      debug!("restarting recognizer");
      guard.start_recognizer();
    });
  }

  fn start_recognizer(&self) {
    match self.inner.recognizer.start() {
      Ok(()) => {
        let mut core = self.inner.core();
        if core.state == GuardState::Starting {
          core.state = GuardState::Listening;
        }
      }
      Err(fault) => self.on_fault(fault),
    }
  }
}
