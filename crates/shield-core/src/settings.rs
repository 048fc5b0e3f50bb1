//! Per-user preferences.

use serde::{Deserialize, Serialize};

/// Template used when the user has not written their own alert text.
pub const DEFAULT_TEMPLATE: &str =
  "EMERGENCY: I am in danger. Direct 112 Call Initiated. Tracking via She Shield.";

/// National emergency number dialed on every activation.
pub const DEFAULT_EMERGENCY_NUMBER: &str = "112";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
  /// Name shown in outgoing alerts.
  pub user_name:         String,
  pub voice_trigger:     bool,
  pub shake_trigger:     bool,
  pub auto_record_audio: bool,
  pub auto_record_video: bool,
  pub sms_template:      String,
  /// When set, "I am safe" returns to the disguised screen rather than idle.
  pub secret_mode:       bool,
  pub biometric_enabled: bool,
  pub emergency_number:  String,
}

impl Default for UserSettings {
  fn default() -> Self {
    Self {
      user_name:         "User".into(),
      voice_trigger:     true,
      shake_trigger:     true,
      auto_record_audio: true,
      auto_record_video: false,
      sms_template:      DEFAULT_TEMPLATE.into(),
      secret_mode:       false,
      biometric_enabled: false,
      emergency_number:  DEFAULT_EMERGENCY_NUMBER.into(),
    }
  }
}

impl UserSettings {
  pub fn auto_record(&self) -> bool { self.auto_record_audio || self.auto_record_video }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_fields_take_defaults() {
    let s: UserSettings =
      serde_json::from_str(r#"{"user_name":"Asha","secret_mode":true}"#).unwrap();
    assert_eq!(s.user_name, "Asha");
    assert!(s.secret_mode);
    assert_eq!(s.emergency_number, "112");
    assert_eq!(s.sms_template, DEFAULT_TEMPLATE);
    assert!(s.auto_record());
  }
}
