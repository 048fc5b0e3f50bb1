//! Nearby-help results.

use serde::{Deserialize, Serialize};

/// A place the user can go to, tagged by where the information came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum HelpResult {
  /// A place entry from a maps provider.
  OfficialMap { name: String, link: String },
  /// A web search hit.
  WebSearch { name: String, link: String },
  /// Generated locally when the lookup produced nothing usable.
  Fallback { name: String, link: String },
}

impl HelpResult {
  pub fn name(&self) -> &str {
    match self {
      Self::OfficialMap { name, .. } | Self::WebSearch { name, .. } | Self::Fallback { name, .. } => {
        name
      }
    }
  }

  pub fn link(&self) -> &str {
    match self {
      Self::OfficialMap { link, .. } | Self::WebSearch { link, .. } | Self::Fallback { link, .. } => {
        link
      }
    }
  }
}
