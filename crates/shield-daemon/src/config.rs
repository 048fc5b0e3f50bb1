//! Daemon configuration, deserialised from `shield.toml` and `SHIELD_*`
//! environment variables.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use shield_core::contact::PhoneRules;
use shield_dispatch::{
  OrchestratorConfig, locate::LocatorConfig, telephony::ActuatorConfig, voice::VoiceGuardConfig,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub user:       UserConfig,
  pub device:     DeviceConfig,
  pub remote:     RemoteConfig,
  pub timing:     TimingConfig,
  pub phone:      PhoneRules,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".into(),
      port:       8112,
      store_path: PathBuf::from("~/.local/share/shield/shield.db"),
      user:       UserConfig::default(),
      device:     DeviceConfig::default(),
      remote:     RemoteConfig::default(),
      timing:     TimingConfig::default(),
      phone:      PhoneRules::default(),
    }
  }
}

/// The signed-in user. An empty `user_id` means nobody is signed in.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserConfig {
  pub user_id:      String,
  pub display_name: String,
}

impl Default for UserConfig {
  fn default() -> Self { Self { user_id: "local".into(), display_name: "User".into() } }
}

/// Stand-ins for device sensors on a host without them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
  /// Fixed position reported by the location provider, if any.
  pub latitude:  Option<f64>,
  pub longitude: Option<f64>,
  /// Initial connectivity, until the reachability probe says otherwise.
  pub online:    bool,
}

impl Default for DeviceConfig {
  fn default() -> Self { Self { latitude: None, longitude: None, online: true } }
}

/// Remote services. Any endpoint left unset is treated as unreachable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
  pub relay_url:        Option<String>,
  pub uplink_url:       Option<String>,
  pub places_url:       Option<String>,
  pub geocode_url:      Option<String>,
  pub api_key:          Option<String>,
  pub timeout_secs:     u64,
  /// How often to probe `relay_url` for reachability.
  pub probe_every_secs: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      relay_url:        None,
      uplink_url:       None,
      places_url:       None,
      geocode_url:      None,
      api_key:          None,
      timeout_secs:     10,
      probe_every_secs: 5,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
  pub signal_poll_secs:       u64,
  pub voice_repeat_secs:      u64,
  pub location_timeout_secs:  u64,
  pub connectivity_poll_secs: u64,
  pub voice_cooldown_secs:    u64,
  pub settings_timeout_ms:    u64,
}

impl Default for TimingConfig {
  fn default() -> Self {
    Self {
      signal_poll_secs:       4,
      voice_repeat_secs:      15,
      location_timeout_secs:  5,
      connectivity_poll_secs: 5,
      voice_cooldown_secs:    2,
      settings_timeout_ms:    750,
    }
  }
}

impl DaemonConfig {
  pub fn orchestrator_config(&self) -> OrchestratorConfig {
    let t = &self.timing;
    OrchestratorConfig {
      actuators: ActuatorConfig {
        signal_poll:  Duration::from_secs(t.signal_poll_secs),
        voice_repeat: Duration::from_secs(t.voice_repeat_secs),
      },
      locator: LocatorConfig {
        timeout: Duration::from_secs(t.location_timeout_secs),
        ..LocatorConfig::default()
      },
      voice: VoiceGuardConfig { cooldown: Duration::from_secs(t.voice_cooldown_secs) },
      phone_rules: self.phone.clone(),
      connectivity_poll: Duration::from_secs(t.connectivity_poll_secs),
      settings_timeout: Duration::from_millis(t.settings_timeout_ms),
      ..OrchestratorConfig::default()
    }
  }
}
