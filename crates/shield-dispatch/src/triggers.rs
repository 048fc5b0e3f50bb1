//! Gesture and phrase detectors that turn raw sensor input into SOS triggers.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// What caused an activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSource {
  Button,
  Shake,
  Voice { phrase: String },
}

// ─── Shake ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ShakeConfig {
  /// Acceleration magnitude, in m/s², that counts as a peak.
  pub threshold: f64,
  /// Peaks further apart than this restart the count.
  pub window:    Duration,
  /// Peaks needed to fire.
  pub peaks:     u32,
}

impl Default for ShakeConfig {
  fn default() -> Self {
    Self { threshold: 28.0, window: Duration::from_millis(800), peaks: 4 }
  }
}

/// One accelerometer reading including gravity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
  pub x: f64,
  pub y: f64,
  pub z: f64,
}

impl Acceleration {
  pub fn magnitude(&self) -> f64 { (self.x * self.x + self.y * self.y + self.z * self.z).sqrt() }
}

#[derive(Debug)]
pub struct ShakeDetector {
  config:    ShakeConfig,
  count:     u32,
  last_peak: Option<Instant>,
}

impl ShakeDetector {
  pub fn new(config: ShakeConfig) -> Self { Self { config, count: 0, last_peak: None } }

  /// Feed one sample taken at `at`. Returns `true` when the shake gesture
  /// completes; the count then starts over.
  pub fn observe(&mut self, sample: Acceleration, at: Instant) -> bool {
    if sample.magnitude() <= self.config.threshold {
      return false;
    }

    let chained = self
      .last_peak
      .is_some_and(|prev| at.saturating_duration_since(prev) < self.config.window);
    self.count = if chained { self.count + 1 } else { 1 };
    self.last_peak = Some(at);

    if self.count >= self.config.peaks {
      self.count = 0;
      return true;
    }
    false
  }
}

impl Default for ShakeDetector {
  fn default() -> Self { Self::new(ShakeConfig::default()) }
}

// ─── Phrases ─────────────────────────────────────────────────────────────────

pub const DEFAULT_PHRASES: &[&str] = &["help help", "help me", "danger", "bachao", "emergency"];

/// Case-insensitive, whole-word phrase matching over recognizer transcripts.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
  phrases: Vec<Vec<String>>,
}

fn words(text: &str) -> Vec<String> {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
    .map(str::to_lowercase)
    .collect()
}

impl PhraseMatcher {
  pub fn new<I, P>(phrases: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
  {
    Self {
      phrases: phrases
        .into_iter()
        .map(|p| words(p.as_ref()))
        .filter(|w| !w.is_empty())
        .collect(),
    }
  }

  /// The first configured phrase found in `transcript`, space-joined.
  pub fn find(&self, transcript: &str) -> Option<String> {
    let heard = words(transcript);
    self
      .phrases
      .iter()
      .find(|phrase| heard.windows(phrase.len()).any(|w| w == phrase.as_slice()))
      .map(|phrase| phrase.join(" "))
  }
}

impl Default for PhraseMatcher {
  fn default() -> Self { Self::new(DEFAULT_PHRASES.iter().copied()) }
}

#[cfg(test)]
mod tests {
  use super::*;

  const HARD: Acceleration = Acceleration { x: 20.0, y: 20.0, z: 9.8 };
  const STILL: Acceleration = Acceleration { x: 0.0, y: 0.0, z: 9.8 };

  #[test]
  fn four_quick_peaks_fire() {
    let mut d = ShakeDetector::default();
    let t0 = Instant::now();
    let ms = |n| t0 + Duration::from_millis(n);

    assert!(!d.observe(HARD, ms(0)));
    assert!(!d.observe(STILL, ms(100)));
    assert!(!d.observe(HARD, ms(300)));
    assert!(!d.observe(HARD, ms(600)));
    assert!(d.observe(HARD, ms(900)));
    assert!(!d.observe(HARD, ms(1000)), "count restarts after firing");
  }

  #[test]
  fn slow_peaks_restart_the_count() {
    let mut d = ShakeDetector::default();
    let t0 = Instant::now();
    let ms = |n| t0 + Duration::from_millis(n);

    for n in [0, 900, 1800, 2700, 3600] {
      assert!(!d.observe(HARD, ms(n)));
    }
  }

  #[test]
  fn phrases_match_whole_words_only() {
    let m = PhraseMatcher::default();
    assert_eq!(m.find("Please HELP me now").as_deref(), Some("help me"));
    assert_eq!(m.find("bachao!").as_deref(), Some("bachao"));
    assert_eq!(m.find("help, help").as_deref(), Some("help help"));
    assert_eq!(m.find("endangered species"), None);
    assert_eq!(m.find("helpme"), None);
    assert_eq!(m.find("help"), None);
  }
}
