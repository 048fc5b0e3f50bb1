//! Per-user trusted-contact registry.

use std::sync::Arc;

use shield_core::{
  contact::{Contact, ContactBook, NewContact, PhoneRules},
  settings::DEFAULT_EMERGENCY_NUMBER,
  store::{KvStore, keys},
};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::{Error, Result, kv};

pub struct ContactRegistry<S> {
  store:      Arc<S>,
  rules:      PhoneRules,
  write_lock: Mutex<()>,
}

impl<S: KvStore> ContactRegistry<S> {
  pub fn new(store: Arc<S>, rules: PhoneRules) -> Self {
    Self { store, rules, write_lock: Mutex::new(()) }
  }

  /// The user's contacts. A user who has never saved any gets the national
  /// emergency service as a single seed entry. The seed always carries
  /// [`DEFAULT_EMERGENCY_NUMBER`]; a configured emergency number changes
  /// what is dialed, not who is alerted.
  pub async fn list(&self, user_id: &str) -> Result<ContactBook> {
    match kv::load(&*self.store, &keys::contacts(user_id)).await? {
      Some(book) => Ok(book),
      None => Ok(ContactBook::seeded(DEFAULT_EMERGENCY_NUMBER)?),
    }
  }

  /// The contacts an activation alerts. Waits out any edit in progress, so
  /// an edit that passed its freeze check is always visible here.
  pub async fn snapshot(&self, user_id: &str) -> Result<ContactBook> {
    let _guard = self.write_lock.lock().await;
    self.list(user_id).await
  }

  /// Validate and save a contact. `frozen` is checked once the write lock
  /// is held.
  pub async fn add(
    &self,
    user_id: &str,
    input: NewContact,
    frozen: impl FnOnce() -> bool,
  ) -> Result<Contact> {
    let _guard = self.write_lock.lock().await;
    if frozen() {
      return Err(Error::ContactsFrozen);
    }
    let mut book = self.list(user_id).await?;
    let contact = book.add(input, &self.rules)?;
    kv::save(&*self.store, &keys::contacts(user_id), &book).await?;
    info!(user_id, contact_id = %contact.contact_id, "contact added");
    Ok(contact)
  }

  pub async fn remove(
    &self,
    user_id: &str,
    contact_id: Uuid,
    frozen: impl FnOnce() -> bool,
  ) -> Result<Contact> {
    let _guard = self.write_lock.lock().await;
    if frozen() {
      return Err(Error::ContactsFrozen);
    }
    let mut book = self.list(user_id).await?;
    let removed = book.remove(contact_id)?;
    kv::save(&*self.store, &keys::contacts(user_id), &book).await?;
    info!(user_id, %contact_id, "contact removed");
    Ok(removed)
  }
}

#[cfg(test)]
mod tests {
  use shield_core::store::MemoryStore;

  use super::*;

  fn registry() -> ContactRegistry<MemoryStore> {
    ContactRegistry::new(Arc::new(MemoryStore::new()), PhoneRules::default())
  }

  #[tokio::test]
  async fn new_user_sees_seed_contact() {
    let reg = registry();
    let book = reg.list("u1").await.unwrap();
    assert_eq!(book.len(), 1);
    assert_eq!(book.contacts()[0].phone.as_str(), "112");
  }

  #[tokio::test]
  async fn duplicate_phone_rejected_across_formats() {
    let reg = registry();
    reg
      .add("u1", NewContact { name: "Mom".into(), phone: "+91 98765 43210".into() }, || false)
      .await
      .unwrap();

    let err = reg
      .add("u1", NewContact { name: "Mother".into(), phone: "919876543210".into() }, || false)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Core(shield_core::Error::DuplicatePhone(_))));
    assert_eq!(reg.list("u1").await.unwrap().len(), 2);

    // Another user may hold the same number.
    reg
      .add("u2", NewContact { name: "Mom".into(), phone: "9876543210".into() }, || false)
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn seed_can_be_removed_before_first_save() {
    let reg = registry();
    let seed = reg.list("u1").await.unwrap().contacts()[0].clone();
    reg.remove("u1", seed.contact_id, || false).await.unwrap();
    assert!(reg.list("u1").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn remove_persists() {
    let reg = registry();
    let c = reg
      .add("u1", NewContact { name: "Dad".into(), phone: "9123456780".into() }, || false)
      .await
      .unwrap();
    reg.remove("u1", c.contact_id, || false).await.unwrap();

    let book = reg.list("u1").await.unwrap();
    assert!(book.contacts().iter().all(|x| x.contact_id != c.contact_id));
  }

  #[tokio::test]
  async fn frozen_edits_leave_the_book_alone() {
    let reg = registry();
    let err = reg
      .add("u1", NewContact { name: "Asha".into(), phone: "9876543210".into() }, || true)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::ContactsFrozen));

    let seed = reg.snapshot("u1").await.unwrap().contacts()[0].clone();
    let err = reg.remove("u1", seed.contact_id, || true).await.unwrap_err();
    assert!(matches!(err, Error::ContactsFrozen));
    assert_eq!(reg.snapshot("u1").await.unwrap().contacts(), &[seed][..]);
  }
}
