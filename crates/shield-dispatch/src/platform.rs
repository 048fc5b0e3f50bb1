//! The bundle of platform ports handed to the orchestrator at construction.

use std::sync::Arc;

use shield_core::ports::{
  AddressResolver, CloudMessenger, ConnectivityProbe, Dialer, EvidenceRecorder, HelpOracle,
  IdentityProvider, LocationProvider, LogUplink, MessageComposer, SirenDevice, SpeechRecognizer,
  SpeechSynth,
};

/// Every external capability the dispatch layer talks to.
#[derive(Clone)]
pub struct Platform {
  pub identity:     Arc<dyn IdentityProvider>,
  pub location:     Arc<dyn LocationProvider>,
  pub address:      Arc<dyn AddressResolver>,
  pub help:         Arc<dyn HelpOracle>,
  pub cloud:        Arc<dyn CloudMessenger>,
  pub uplink:       Arc<dyn LogUplink>,
  pub evidence:     Arc<dyn EvidenceRecorder>,
  pub dialer:       Arc<dyn Dialer>,
  pub composer:     Arc<dyn MessageComposer>,
  pub siren:        Arc<dyn SirenDevice>,
  pub speech:       Arc<dyn SpeechSynth>,
  pub recognizer:   Arc<dyn SpeechRecognizer>,
  pub connectivity: Arc<dyn ConnectivityProbe>,
}
