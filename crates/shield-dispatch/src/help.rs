//! Nearby police lookup with local fallbacks.

use std::{collections::HashSet, sync::Arc};

use shield_core::{help::HelpResult, location::Location, ports::HelpOracle};
use tracing::{info, warn};

/// Results shown to the user at most.
pub const MAX_HELP_RESULTS: usize = 3;

pub struct NearbyHelp {
  oracle: Arc<dyn HelpOracle>,
}

impl NearbyHelp {
  pub fn new(oracle: Arc<dyn HelpOracle>) -> Self { Self { oracle } }

  /// Look up police near `location`. Never fails and never returns an empty
  /// list: an empty answer or an oracle failure yields one fallback entry.
  pub async fn search(&self, location: &Location) -> Vec<HelpResult> {
    match self.oracle.find_nearby(location.latitude, location.longitude).await {
      Ok(raw) => {
        let refined = refine(raw);
        if refined.is_empty() {
          info!("no nearby help found; using regional fallback");
          vec![HelpResult::Fallback {
            name: "District Police Headquarters".into(),
            link: location.police_search_link(),
          }]
        } else {
          info!(found = refined.len(), "nearby help located");
          refined
        }
      }
      Err(e) => {
        warn!(error = %e, "nearby help lookup failed");
        vec![HelpResult::Fallback {
          name: "National Help Desk 112".into(),
          link: location.police_search_link(),
        }]
      }
    }
  }
}

/// Drop entries without a link, keep the first entry per name, cap the list.
fn refine(raw: Vec<HelpResult>) -> Vec<HelpResult> {
  let mut seen = HashSet::new();
  raw
    .into_iter()
    .filter(|r| !r.link().trim().is_empty())
    .filter(|r| seen.insert(r.name().to_string()))
    .take(MAX_HELP_RESULTS)
    .collect()
}
