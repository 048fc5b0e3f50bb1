//! The `KvStore` trait, the key layout, and an in-memory backend.
//!
//! Values are opaque strings; callers serialise with `serde_json`. There are no
//! cross-key transactions. Backends live in separate crates
//! (`shield-store-sqlite`); [`MemoryStore`] exists for tests and ephemeral
//! deployments.

use std::{
  collections::HashMap,
  convert::Infallible,
  future::Future,
  sync::{Mutex, PoisonError},
};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Storage keys. Per-user keys embed the user id; the pending queue is global.
pub mod keys {
  /// Episodes awaiting uplink acknowledgment, across all users.
  pub const PENDING_QUEUE: &str = "sos:pending";

  pub fn history(user_id: &str) -> String { format!("sos:history:{user_id}") }

  pub fn contacts(user_id: &str) -> String { format!("contacts:{user_id}") }

  pub fn settings(user_id: &str) -> String { format!("settings:{user_id}") }

  pub fn pin(user_id: &str) -> String { format!("pin:{user_id}") }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// A string key-value store.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded runtimes and axum handlers.
pub trait KvStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch a value. `None` if the key has never been written or was deleted.
  fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;

  /// Insert or overwrite a value.
  fn put(&self, key: &str, value: String) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Remove a key. Removing an absent key is not an error.
  fn delete(&self, key: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

// ─── In-memory backend ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn with<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> T {
    let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
  }
}

impl KvStore for MemoryStore {
  type Error = Infallible;

  async fn get(&self, key: &str) -> Result<Option<String>, Infallible> {
    Ok(self.with(|m| m.get(key).cloned()))
  }

  async fn put(&self, key: &str, value: String) -> Result<(), Infallible> {
    self.with(|m| m.insert(key.to_string(), value));
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), Infallible> {
    self.with(|m| m.remove(key));
    Ok(())
  }
}
