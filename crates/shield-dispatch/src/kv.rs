//! JSON helpers over [`KvStore`].

use serde::{Serialize, de::DeserializeOwned};
use shield_core::store::KvStore;

use crate::{Error, Result};

pub(crate) async fn load<S, T>(store: &S, key: &str) -> Result<Option<T>>
where
  S: KvStore,
  T: DeserializeOwned,
{
  match store.get(key).await.map_err(Error::store)? {
    Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
    None => Ok(None),
  }
}

pub(crate) async fn save<S, T>(store: &S, key: &str, value: &T) -> Result<()>
where
  S: KvStore,
  T: Serialize + ?Sized,
{
  let raw = serde_json::to_string(value)?;
  store.put(key, raw).await.map_err(Error::store)
}
