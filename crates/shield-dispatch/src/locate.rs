//! Best-effort location fix and address resolution.

use std::{
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use shield_core::{
  location::Location,
  ports::{AddressResolver, LocationProvider},
};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LocatorConfig {
  /// Upper bound on waiting for a fresh fix.
  pub timeout:       Duration,
  pub high_accuracy: bool,
}

impl Default for LocatorConfig {
  fn default() -> Self {
    Self { timeout: Duration::from_secs(5), high_accuracy: true }
  }
}

pub struct Locator {
  provider:   Arc<dyn LocationProvider>,
  resolver:   Arc<dyn AddressResolver>,
  config:     LocatorConfig,
  last_known: Mutex<Option<Location>>,
}

impl Locator {
  pub fn new(
    provider: Arc<dyn LocationProvider>,
    resolver: Arc<dyn AddressResolver>,
    config: LocatorConfig,
  ) -> Self {
    Self { provider, resolver, config, last_known: Mutex::new(None) }
  }

  /// A fresh fix, or the last known location if none arrives within the
  /// configured timeout. `None` only when no fix has ever been obtained.
  pub async fn locate(&self) -> Option<Location> {
    let fix = tokio::time::timeout(
      self.config.timeout,
      self
        .provider
        .current_location(self.config.high_accuracy, self.config.timeout),
    )
    .await;

    match fix {
      Ok(Ok(location)) => {
        debug!(lat = location.latitude, lng = location.longitude, "location fixed");
        self.remember(location);
        Some(location)
      }
      Ok(Err(e)) => {
        warn!(error = %e, "location fix failed; using last known");
        self.last_known()
      }
      Err(_) => {
        warn!(timeout = ?self.config.timeout, "location fix timed out; using last known");
        self.last_known()
      }
    }
  }

  /// Record a fix obtained outside [`Locator::locate`], e.g. from a passive
  /// position watch.
  pub fn remember(&self, location: Location) {
    *self.last_known.lock().unwrap_or_else(PoisonError::into_inner) = Some(location);
  }

  pub fn last_known(&self) -> Option<Location> {
    *self.last_known.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Human-readable address for `location`; the formatted coordinates when
  /// the resolver fails or returns nothing.
  pub async fn resolve_address(&self, location: &Location) -> String {
    match self.resolver.resolve(location.latitude, location.longitude).await {
      Ok(address) if !address.trim().is_empty() => address.trim().to_string(),
      Ok(_) => location.format_coords(),
      Err(e) => {
        warn!(error = %e, "address resolution failed; using coordinates");
        location.format_coords()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{FakeAddress, FakeLocation};

  fn locator(provider: FakeLocation, resolver: FakeAddress) -> Locator {
    Locator::new(Arc::new(provider), Arc::new(resolver), LocatorConfig::default())
  }

  #[tokio::test(start_paused = true)]
  async fn stalled_fix_falls_back_after_timeout() {
    let loc = locator(FakeLocation::hanging(), FakeAddress::ok("x"));
    assert_eq!(loc.locate().await, None);

    let known = Location::new(1.0, 2.0);
    loc.remember(known);
    let started = tokio::time::Instant::now();
    assert_eq!(loc.locate().await, Some(known));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
  }

  #[tokio::test]
  async fn fresh_fix_updates_last_known() {
    let fix = Location::new(12.0, 77.0);
    let loc = locator(FakeLocation::fixed(fix), FakeAddress::ok("x"));
    assert_eq!(loc.locate().await, Some(fix));
    assert_eq!(loc.last_known(), Some(fix));
  }

  #[tokio::test]
  async fn failed_fix_uses_last_known() {
    let loc = locator(FakeLocation::failing(), FakeAddress::ok("x"));
    let known = Location::new(3.0, 4.0);
    loc.remember(known);
    assert_eq!(loc.locate().await, Some(known));
  }

  #[tokio::test]
  async fn address_falls_back_to_coordinates() {
    let at = Location::new(28.61394, 77.20902);

    let loc = locator(FakeLocation::failing(), FakeAddress::failing());
    assert_eq!(loc.resolve_address(&at).await, "28.6139, 77.2090");

    let loc = locator(FakeLocation::failing(), FakeAddress::ok("  "));
    assert_eq!(loc.resolve_address(&at).await, "28.6139, 77.2090");

    let loc = locator(FakeLocation::failing(), FakeAddress::ok("Janpath, New Delhi"));
    assert_eq!(loc.resolve_address(&at).await, "Janpath, New Delhi");
  }
}
