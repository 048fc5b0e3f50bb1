//! Emergency episodes and per-contact dispatch state.
//!
//! An [`Episode`] is the forensic record of one SOS activation. Its content is
//! fixed at creation; the only permitted mutations are appending a dialed
//! number and flipping [`SyncStatus::Pending`] to [`SyncStatus::Synced`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{contact::PhoneNumber, location::Location};

// ─── Sync status ─────────────────────────────────────────────────────────────

/// Whether the remote uplink has acknowledged an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
  Pending,
  Synced,
}

// ─── Dispatch state ──────────────────────────────────────────────────────────

/// Delivery state of the alert to a single contact.
///
/// Transitions are `Pending → Sending → {Sent | Error}`; the two terminal
/// states never change again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
  #[default]
  Pending,
  Sending,
  Sent,
  Error,
}

impl DispatchState {
  fn rank(self) -> u8 {
    match self {
      Self::Pending => 0,
      Self::Sending => 1,
      Self::Sent | Self::Error => 2,
    }
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Sent | Self::Error) }

  /// Whether moving from `self` to `next` is a forward transition.
  pub fn can_advance_to(self, next: DispatchState) -> bool {
    !self.is_terminal() && next.rank() > self.rank()
  }
}

/// Final result of dispatching to one contact, as recorded on the episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactOutcome {
  pub name:        String,
  pub phone:       PhoneNumber,
  pub state:       DispatchState,
  pub resolved_at: DateTime<Utc>,
}

// ─── Evidence ────────────────────────────────────────────────────────────────

/// What kind of media the evidence recorder captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
  Audio,
  Video,
  AudioVideo,
}

/// Opaque pointer to recorded evidence held by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
  pub evidence_id: String,
  pub kind:        EvidenceKind,
  pub started_at:  DateTime<Utc>,
}

// ─── Episode ─────────────────────────────────────────────────────────────────

/// The forensic record of one emergency activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
  pub episode_id:       Uuid,
  pub user_id:          String,
  pub user_name:        String,
  pub created_at:       DateTime<Utc>,
  pub location:         Location,
  /// Resolved street address, or formatted coordinates when resolution failed.
  pub address:          String,
  pub status:           SyncStatus,
  /// Append-only, in the order the numbers were dialed.
  pub dialed_numbers:   Vec<PhoneNumber>,
  pub contact_outcomes: Vec<ContactOutcome>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub evidence:         Option<EvidenceRef>,
}

/// Everything needed to create an [`Episode`]; id, timestamp and status are
/// assigned by the logger.
#[derive(Debug, Clone)]
pub struct NewEpisode {
  pub user_id:          String,
  pub user_name:        String,
  pub location:         Location,
  pub address:          String,
  pub dialed_numbers:   Vec<PhoneNumber>,
  pub contact_outcomes: Vec<ContactOutcome>,
  pub evidence:         Option<EvidenceRef>,
}

impl Episode {
  /// Materialise a new pending episode.
  pub fn create(new: NewEpisode) -> Self {
    Self {
      episode_id:       Uuid::new_v4(),
      user_id:          new.user_id,
      user_name:        new.user_name,
      created_at:       Utc::now(),
      location:         new.location,
      address:          new.address,
      status:           SyncStatus::Pending,
      dialed_numbers:   new.dialed_numbers,
      contact_outcomes: new.contact_outcomes,
      evidence:         new.evidence,
    }
  }

  pub fn mark_synced(&mut self) { self.status = SyncStatus::Synced; }

  pub fn append_dialed(&mut self, number: PhoneNumber) { self.dialed_numbers.push(number); }
}
