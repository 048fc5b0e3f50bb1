//! [`SqliteStore`], the SQLite implementation of [`KvStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use shield_core::store::KvStore;

use crate::{
  encode::{decode_dt, encode_dt},
  schema::SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A key-value store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// When `key` was last written, if it exists.
  pub async fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
    let key = key.to_string();
    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT updated_at FROM kv WHERE key = ?1",
              rusqlite::params![key],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    raw.as_deref().map(decode_dt).transpose()
  }
}

// ─── KvStore impl ────────────────────────────────────────────────────────────

impl KvStore for SqliteStore {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<String>> {
    let key = key.to_string();
    let value = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM kv WHERE key = ?1",
              rusqlite::params![key],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(value)
  }

  async fn put(&self, key: &str, value: String) -> Result<()> {
    let key = key.to_string();
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                          updated_at = excluded.updated_at",
          rusqlite::params![key, value, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let key = key.to_string();
    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
