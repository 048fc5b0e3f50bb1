//! Network intelligence: turning raw connectivity readings into a signal
//! level and a preferred transport.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Effective connection type as reported by the platform's network API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectiveType {
  #[serde(rename = "slow-2g")]
  Slow2g,
  #[serde(rename = "2g")]
  G2,
  #[serde(rename = "3g")]
  G3,
  #[serde(rename = "4g")]
  G4,
  #[default]
  #[serde(rename = "unknown")]
  Unknown,
}

impl EffectiveType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Slow2g => "slow-2g",
      Self::G2 => "2g",
      Self::G3 => "3g",
      Self::G4 => "4g",
      Self::Unknown => "unknown",
    }
  }
}

impl FromStr for EffectiveType {
  type Err = std::convert::Infallible;

  /// Unrecognised labels map to [`EffectiveType::Unknown`].
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.trim().to_ascii_lowercase().as_str() {
      "slow-2g" => Self::Slow2g,
      "2g" => Self::G2,
      "3g" => Self::G3,
      "4g" => Self::G4,
      _ => Self::Unknown,
    })
  }
}

impl fmt::Display for EffectiveType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Link-quality reading, when the platform exposes one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkQuality {
  pub effective_type: EffectiveType,
  /// Estimated downlink in Mbit/s.
  pub downlink:       f64,
}

/// A raw connectivity reading from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivitySignal {
  pub online:          bool,
  /// Free-form label such as `"wifi"` or `"cellular"`.
  pub connection_type: String,
  pub quality:         Option<LinkQuality>,
}

impl ConnectivitySignal {
  pub fn online() -> Self {
    Self { online: true, connection_type: "unknown".into(), quality: None }
  }

  pub fn offline() -> Self {
    Self { online: false, connection_type: "none".into(), quality: None }
  }
}

/// Channel used to reach contacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
  Cloud,
  Gsm,
}

/// Classified network state. Transient; recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
  pub online:          bool,
  pub connection_type: String,
  pub effective_type:  EffectiveType,
  pub downlink:        f64,
  /// 0 (no usable signal) through 4 (strong broadband).
  pub signal_level:    u8,
  pub preferred:       Transport,
}

impl NetworkStatus {
  /// Classify a connectivity reading. Total: every input yields a status.
  pub fn classify(signal: &ConnectivitySignal) -> Self {
    let Some(quality) = signal.quality else {
      let (signal_level, preferred) =
        if signal.online { (3, Transport::Cloud) } else { (0, Transport::Gsm) };
      return Self {
        online: signal.online,
        connection_type: signal.connection_type.clone(),
        effective_type: EffectiveType::Unknown,
        downlink: 0.0,
        signal_level,
        preferred,
      };
    };

    let downlink = if quality.downlink.is_finite() { quality.downlink } else { 0.0 };
    let signal_level = match quality.effective_type {
      EffectiveType::G4 if downlink > 5.0 => 4,
      EffectiveType::G4 => 3,
      EffectiveType::G3 if downlink > 2.0 => 3,
      EffectiveType::G3 => 2,
      EffectiveType::G2 | EffectiveType::Slow2g => 1,
      EffectiveType::Unknown => 0,
    };
    let preferred = if signal.online && signal_level >= 2 {
      Transport::Cloud
    } else {
      Transport::Gsm
    };

    Self {
      online: signal.online,
      connection_type: signal.connection_type.clone(),
      effective_type: quality.effective_type,
      downlink,
      signal_level,
      preferred,
    }
  }

  /// Whether a GSM call can be attempted at all.
  pub fn can_dial(&self) -> bool { self.signal_level > 0 || self.online }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn reading(online: bool, et: EffectiveType, downlink: f64) -> ConnectivitySignal {
    ConnectivitySignal {
      online,
      connection_type: "cellular".into(),
      quality: Some(LinkQuality { effective_type: et, downlink }),
    }
  }

  #[test]
  fn fast_4g_is_level_four_cloud() {
    let status = NetworkStatus::classify(&reading(true, EffectiveType::G4, 10.0));
    assert_eq!(status.signal_level, 4);
    assert_eq!(status.preferred, Transport::Cloud);
  }

  #[test]
  fn offline_without_quality_is_level_zero_gsm() {
    let status = NetworkStatus::classify(&ConnectivitySignal::offline());
    assert_eq!(status.signal_level, 0);
    assert_eq!(status.preferred, Transport::Gsm);
    assert!(!status.can_dial());
  }

  #[test]
  fn online_without_quality_assumes_level_three() {
    let status = NetworkStatus::classify(&ConnectivitySignal::online());
    assert_eq!((status.signal_level, status.preferred), (3, Transport::Cloud));
  }

  #[test]
  fn level_table() {
    let cases = [
      (EffectiveType::G4, 5.0, 3),
      (EffectiveType::G3, 2.5, 3),
      (EffectiveType::G3, 1.0, 2),
      (EffectiveType::G2, 0.1, 1),
      (EffectiveType::Slow2g, 0.05, 1),
      (EffectiveType::Unknown, 50.0, 0),
    ];
    for (et, dl, expected) in cases {
      let status = NetworkStatus::classify(&reading(true, et, dl));
      assert_eq!(status.signal_level, expected, "{et} @ {dl}");
    }
  }

  #[test]
  fn offline_never_prefers_cloud() {
    let status = NetworkStatus::classify(&reading(false, EffectiveType::G4, 20.0));
    assert_eq!(status.signal_level, 4);
    assert_eq!(status.preferred, Transport::Gsm);
    assert!(status.can_dial());
  }

  #[test]
  fn classification_is_deterministic() {
    let input = reading(true, EffectiveType::G3, 2.1);
    assert_eq!(NetworkStatus::classify(&input), NetworkStatus::classify(&input));
  }

  #[test]
  fn unknown_labels_parse_to_unknown() {
    assert_eq!("5g".parse::<EffectiveType>().unwrap(), EffectiveType::Unknown);
    assert_eq!(" 4G ".parse::<EffectiveType>().unwrap(), EffectiveType::G4);
  }
}
