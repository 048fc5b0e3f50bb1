//! Persistence of [`UserSettings`].

use std::sync::Arc;

use shield_core::{
  ports::UserProfile,
  settings::UserSettings,
  store::{KvStore, keys},
};

use crate::{Result, kv};

pub struct SettingsRepo<S> {
  store: Arc<S>,
}

impl<S: KvStore> SettingsRepo<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Stored settings, or defaults carrying the profile's display name.
  pub async fn load(&self, profile: &UserProfile) -> Result<UserSettings> {
    Ok(
      kv::load(&*self.store, &keys::settings(&profile.user_id))
        .await?
        .unwrap_or_else(|| UserSettings {
          user_name: profile.display_name.clone(),
          ..UserSettings::default()
        }),
    )
  }

  pub async fn save(&self, user_id: &str, settings: &UserSettings) -> Result<()> {
    kv::save(&*self.store, &keys::settings(user_id), settings).await
  }
}

#[cfg(test)]
mod tests {
  use shield_core::store::MemoryStore;

  use super::*;

  #[tokio::test]
  async fn defaults_use_display_name_until_saved() {
    let repo = SettingsRepo::new(Arc::new(MemoryStore::new()));
    let profile = UserProfile { user_id: "u1".into(), display_name: "Asha".into() };

    let mut s = repo.load(&profile).await.unwrap();
    assert_eq!(s.user_name, "Asha");
    assert!(!s.secret_mode);

    s.secret_mode = true;
    s.user_name = "A. K.".into();
    repo.save("u1", &s).await.unwrap();
    assert_eq!(repo.load(&profile).await.unwrap(), s);
  }
}
