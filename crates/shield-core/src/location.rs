//! Device coordinates and the textual forms derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder shown wherever a location has not been fixed yet.
pub const LOCATING: &str = "Locating...";

/// A best-effort device position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
  pub latitude:      f64,
  pub longitude:     f64,
  /// Horizontal accuracy radius in metres, when the provider reports one.
  pub accuracy:      Option<f64>,
  /// When the provider obtained the fix.
  pub fix_timestamp: Option<DateTime<Utc>>,
}

impl Location {
  pub fn new(latitude: f64, longitude: f64) -> Self {
    Self { latitude, longitude, accuracy: None, fix_timestamp: None }
  }

  /// `"lat, lng"` with four decimal places; the address of last resort.
  pub fn format_coords(&self) -> String {
    format!("{:.4}, {:.4}", self.latitude, self.longitude)
  }

  /// A map link recipients can open directly.
  pub fn map_link(&self) -> String {
    format!("https://maps.google.com/?q={},{}", self.latitude, self.longitude)
  }

  /// A generic map search for police stations around this position.
  pub fn police_search_link(&self) -> String {
    format!(
      "https://www.google.com/maps/search/police+station/@{},{},15z",
      self.latitude, self.longitude
    )
  }
}

/// Map link for an optional location, or [`LOCATING`].
pub fn map_link_or_placeholder(location: Option<&Location>) -> String {
  location.map_or_else(|| LOCATING.to_string(), Location::map_link)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coords_are_rounded_to_four_places() {
    let loc = Location::new(28.613_939_1, 77.209_023_4);
    assert_eq!(loc.format_coords(), "28.6139, 77.2090");
  }

  #[test]
  fn missing_location_yields_placeholder_link() {
    assert_eq!(map_link_or_placeholder(None), LOCATING);
    let loc = Location::new(1.5, -2.25);
    assert_eq!(
      map_link_or_placeholder(Some(&loc)),
      "https://maps.google.com/?q=1.5,-2.25"
    );
  }
}
