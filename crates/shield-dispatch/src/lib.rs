//! Emergency dispatch for the shield personal-safety client.
//!
//! [`Orchestrator`] turns a trigger (button, shake, or voice phrase) into one
//! coordinated emergency episode: siren and spoken distress announcement,
//! emergency call, location and address, concurrent alerts to trusted
//! contacts, a write-ahead forensic log, and a nearby-help search. The
//! components it sequences are public so embedders can drive them directly.

pub mod auth;
pub mod contacts;
pub mod dispatcher;
pub mod error;
pub mod forensic;
pub mod help;
pub mod locate;
pub mod monitor;
pub mod orchestrator;
pub mod platform;
pub mod settings;
pub mod telephony;
pub mod triggers;
pub mod voice;

mod kv;

pub use error::{Error, Result};
pub use orchestrator::{
  AppState, EpisodeReport, Orchestrator, OrchestratorConfig, StatusSnapshot, TriggerOutcome,
};
pub use platform::Platform;

/// In-process fakes for every platform port, for this crate's tests and for
/// embedders testing against an orchestrator.
#[cfg(any(test, feature = "testing"))]
pub mod testing;
