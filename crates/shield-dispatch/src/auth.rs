//! Security PIN vault and the authenticator consulted by "I am safe".

use std::{fmt, sync::Arc};

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand_core::OsRng;
use serde::Deserialize;
use shield_core::store::{KvStore, keys};
use tracing::{info, warn};

use crate::{Error, Result};

/// What the user presented to end an emergency.
#[derive(Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
  Pin { pin: String },
  /// Outcome of a platform biometric prompt.
  Biometric { attested: bool },
}

impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Pin { .. } => f.write_str("Pin(..)"),
      Self::Biometric { attested } => f.debug_struct("Biometric").field("attested", attested).finish(),
    }
  }
}

fn valid_pin(pin: &str) -> bool {
  (4..=6).contains(&pin.len()) && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Stores one argon2 PHC string per user.
pub struct PinVault<S> {
  store: Arc<S>,
}

impl<S: KvStore> PinVault<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Set or replace the user's PIN. Must be 4 to 6 ASCII digits.
  pub async fn set_pin(&self, user_id: &str, pin: &str) -> Result<()> {
    if !valid_pin(pin) {
      return Err(Error::InvalidPin);
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(pin.as_bytes(), &salt)
      .map_err(|e| Error::PinHash(e.to_string()))?
      .to_string();
    self
      .store
      .put(&keys::pin(user_id), hash)
      .await
      .map_err(Error::store)?;
    info!(user_id, "security PIN updated");
    Ok(())
  }

  pub async fn has_pin(&self, user_id: &str) -> Result<bool> {
    Ok(self.stored_hash(user_id).await?.is_some())
  }

  /// Whether `pin` matches. A user without a PIN matches nothing.
  pub async fn verify(&self, user_id: &str, pin: &str) -> Result<bool> {
    let Some(phc) = self.stored_hash(user_id).await? else {
      return Ok(false);
    };
    let parsed = PasswordHash::new(&phc).map_err(|e| Error::PinHash(e.to_string()))?;
    Ok(Argon2::default().verify_password(pin.as_bytes(), &parsed).is_ok())
  }

  /// Authorise ending an emergency. Users without a PIN are always allowed;
  /// otherwise the PIN must verify, or a biometric attestation must be
  /// presented with biometric unlock enabled.
  pub async fn authenticate(
    &self,
    user_id: &str,
    credential: Option<&Credential>,
    biometric_enabled: bool,
  ) -> Result<()> {
    if !self.has_pin(user_id).await? {
      return Ok(());
    }

    let ok = match credential {
      Some(Credential::Pin { pin }) => self.verify(user_id, pin).await?,
      Some(Credential::Biometric { attested }) => biometric_enabled && *attested,
      None => false,
    };
    if ok {
      Ok(())
    } else {
      warn!(user_id, "safe request rejected");
      Err(Error::AuthenticationFailed)
    }
  }

  async fn stored_hash(&self, user_id: &str) -> Result<Option<String>> {
    self.store.get(&keys::pin(user_id)).await.map_err(Error::store)
  }
}
