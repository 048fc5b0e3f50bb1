//! Concurrent fan-out of the alert to trusted contacts.

use std::{
  collections::HashMap,
  sync::{Arc, PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use shield_core::{
  contact::{Contact, PhoneNumber},
  episode::{ContactOutcome, DispatchState},
  network::Transport,
  ports::{CloudMessenger, MessageComposer},
};
use tracing::{info, warn};
use uuid::Uuid;

// ─── Progress board ──────────────────────────────────────────────────────────

/// Observable per-contact delivery state for one episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactProgress {
  pub contact_id: Uuid,
  pub name:       String,
  pub phone:      PhoneNumber,
  pub state:      DispatchState,
  /// Set when the entry reaches a terminal state.
  pub updated_at: Option<DateTime<Utc>>,
}

/// Shared, readable-at-any-time map of contact id to delivery state.
///
/// A contact with no entry is pending. Entries only move forward.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
  entries: Arc<RwLock<HashMap<Uuid, ContactProgress>>>,
}

impl ProgressBoard {
  pub fn new() -> Self { Self::default() }

  /// Register `contact` as pending. Existing entries are left alone.
  pub fn track(&self, contact: &Contact) {
    let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    map.entry(contact.contact_id).or_insert_with(|| ContactProgress {
      contact_id: contact.contact_id,
      name:       contact.name.clone(),
      phone:      contact.phone.clone(),
      state:      DispatchState::Pending,
      updated_at: None,
    });
  }

  /// Move a tracked entry forward. Untracked ids and backward moves are
  /// ignored; returns whether the entry changed.
  pub fn advance(&self, contact_id: Uuid, next: DispatchState) -> bool {
    let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    let Some(entry) = map.get_mut(&contact_id) else {
      return false;
    };
    if !entry.state.can_advance_to(next) {
      return false;
    }
    entry.state = next;
    if next.is_terminal() {
      entry.updated_at = Some(Utc::now());
    }
    true
  }

  pub fn state_of(&self, contact_id: Uuid) -> DispatchState {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&contact_id)
      .map_or(DispatchState::Pending, |e| e.state)
  }

  /// All entries, ordered by contact name for stable presentation.
  pub fn snapshot(&self) -> Vec<ContactProgress> {
    let mut out: Vec<_> = self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name).then(a.contact_id.cmp(&b.contact_id)));
    out
  }

  pub fn all_terminal(&self) -> bool {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .all(|e| e.state.is_terminal())
  }
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ContactDispatcher {
  cloud:    Arc<dyn CloudMessenger>,
  composer: Arc<dyn MessageComposer>,
}

impl ContactDispatcher {
  pub fn new(cloud: Arc<dyn CloudMessenger>, composer: Arc<dyn MessageComposer>) -> Self {
    Self { cloud, composer }
  }

  /// Send `message` to one contact. Always returns a terminal state.
  ///
  /// The GSM path hands off to the native composer and reports `Sent`
  /// optimistically; the platform gives no delivery report.
  pub async fn dispatch(&self, contact: &Contact, message: &str, transport: Transport) -> DispatchState {
    match transport {
      Transport::Cloud => match self.cloud.send(&contact.phone, message).await {
        Ok(true) => DispatchState::Sent,
        Ok(false) => {
          warn!(contact = %contact.name, "cloud relay refused message");
          DispatchState::Error
        }
        Err(e) => {
          warn!(contact = %contact.name, error = %e, "cloud send failed");
          DispatchState::Error
        }
      },
      Transport::Gsm => {
        self.composer.compose(&contact.phone, message);
        DispatchState::Sent
      }
    }
  }

  /// Send to every contact concurrently, driving `board` through
  /// pending, sending, and a terminal state for each. Never fails as a whole;
  /// outcomes are returned in `contacts` order.
  pub async fn dispatch_all(
    &self,
    contacts: &[Contact],
    message: &str,
    transport: Transport,
    board: &ProgressBoard,
  ) -> Vec<ContactOutcome> {
    for contact in contacts {
      board.track(contact);
    }

    let sends: Vec<_> = contacts
      .iter()
      .map(|contact| self.dispatch_tracked(contact, message, transport, board))
      .collect();
    let outcomes = join_all(sends).await;

    let sent = outcomes.iter().filter(|o| o.state == DispatchState::Sent).count();
    info!(sent, total = outcomes.len(), ?transport, "alert fan-out complete");
    outcomes
  }

  async fn dispatch_tracked(
    &self,
    contact: &Contact,
    message: &str,
    transport: Transport,
    board: &ProgressBoard,
  ) -> ContactOutcome {
    board.advance(contact.contact_id, DispatchState::Sending);
    let state = self.dispatch(contact, message, transport).await;
    board.advance(contact.contact_id, state);
    ContactOutcome {
      name: contact.name.clone(),
      phone: contact.phone.clone(),
      state,
      resolved_at: Utc::now(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use shield_core::contact::{ContactBook, NewContact, PhoneRules};

  use super::*;
  use crate::testing::{FakeCloud, FakeComposer};

  fn book(names: &[(&str, &str)]) -> Vec<Contact> {
    let mut book = ContactBook::default();
    for (name, phone) in names {
      book
        .add(NewContact { name: (*name).into(), phone: (*phone).into() }, &PhoneRules::default())
        .unwrap();
    }
    book.contacts().to_vec()
  }

  #[test]
  fn board_moves_forward_only() {
    let contacts = book(&[("Asha", "9876543210")]);
    let id = contacts[0].contact_id;
    let board = ProgressBoard::new();

    assert_eq!(board.state_of(id), DispatchState::Pending);
    assert!(!board.advance(id, DispatchState::Sending), "untracked");

    board.track(&contacts[0]);
    assert!(board.advance(id, DispatchState::Sending));
    assert!(board.advance(id, DispatchState::Error));
    assert!(!board.advance(id, DispatchState::Sent));
    assert!(!board.advance(id, DispatchState::Pending));
    assert_eq!(board.state_of(id), DispatchState::Error);
    assert!(board.snapshot()[0].updated_at.is_some());
  }

  #[tokio::test]
  async fn one_failing_contact_does_not_affect_others() {
    let contacts = book(&[
      ("Asha", "9876543210"),
      ("Bala", "9876543211"),
      ("Chitra", "9876543212"),
    ]);
    let cloud = Arc::new(FakeCloud::default());
    cloud.fail_for("+919876543211");
    let dispatcher = ContactDispatcher::new(cloud.clone(), Arc::new(FakeComposer::default()));
    let board = ProgressBoard::new();

    let outcomes = dispatcher
      .dispatch_all(&contacts, "help", Transport::Cloud, &board)
      .await;

    let states: Vec<_> = outcomes.iter().map(|o| o.state).collect();
    assert_eq!(
      states,
      vec![DispatchState::Sent, DispatchState::Error, DispatchState::Sent]
    );
    assert!(board.all_terminal());
    assert_eq!(board.state_of(contacts[1].contact_id), DispatchState::Error);
  }

  #[tokio::test]
  async fn refused_cloud_send_is_an_error() {
    let contacts = book(&[("Asha", "9876543210")]);
    let cloud = Arc::new(FakeCloud::default());
    cloud.refuse_for("+919876543210");
    let dispatcher = ContactDispatcher::new(cloud, Arc::new(FakeComposer::default()));

    let state = dispatcher.dispatch(&contacts[0], "help", Transport::Cloud).await;
    assert_eq!(state, DispatchState::Error);
  }

  #[tokio::test]
  async fn gsm_path_is_optimistic() {
    let contacts = book(&[("Asha", "9876543210"), ("Bala", "9876543211")]);
    let composer = Arc::new(FakeComposer::default());
    let dispatcher = ContactDispatcher::new(Arc::new(FakeCloud::default()), composer.clone());

    let outcomes = dispatcher
      .dispatch_all(&contacts, "help", Transport::Gsm, &ProgressBoard::new())
      .await;

    assert!(outcomes.iter().all(|o| o.state == DispatchState::Sent));
    assert_eq!(composer.composed().len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn sends_run_concurrently() {
    let contacts = book(&[
      ("Asha", "9876543210"),
      ("Bala", "9876543211"),
      ("Chitra", "9876543212"),
    ]);
    let cloud = Arc::new(FakeCloud::with_delay(Duration::from_millis(1500)));
    let dispatcher = ContactDispatcher::new(cloud, Arc::new(FakeComposer::default()));

    let started = tokio::time::Instant::now();
    dispatcher
      .dispatch_all(&contacts, "help", Transport::Cloud, &ProgressBoard::new())
      .await;
    assert!(started.elapsed() < Duration::from_millis(3000));
  }
}
