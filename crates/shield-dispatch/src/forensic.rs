//! Write-ahead forensic log of emergency episodes.
//!
//! Every episode is written to the owner's history before any network
//! activity. Episodes the uplink has not acknowledged sit in a global pending
//! queue until [`ForensicLogger::sync_pending_logs`] drains them.

use std::sync::Arc;

use shield_core::{
  contact::PhoneNumber,
  episode::{Episode, NewEpisode, SyncStatus},
  ports::LogUplink,
  store::{KvStore, keys},
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Result, kv};

/// Number of episodes kept per user.
pub const HISTORY_CAP: usize = 100;

pub struct ForensicLogger<S> {
  store:       Arc<S>,
  uplink:      Arc<dyn LogUplink>,
  history_cap: usize,
  /// Serialises read-modify-write cycles on the history and queue keys.
  write_lock:  Mutex<()>,
}

impl<S: KvStore> ForensicLogger<S> {
  pub fn new(store: Arc<S>, uplink: Arc<dyn LogUplink>, history_cap: usize) -> Self {
    Self { store, uplink, history_cap, write_lock: Mutex::new(()) }
  }

  /// Persist a new episode, then try to get it acknowledged.
  ///
  /// The returned episode is `Synced` only if the uplink acknowledged it;
  /// otherwise it has been queued for a later sync.
  pub async fn log_episode(&self, new: NewEpisode, online: bool) -> Result<Episode> {
    let mut episode = Episode::create(new);

    {
      let _guard = self.write_lock.lock().await;
      let key = keys::history(&episode.user_id);
      let mut history: Vec<Episode> = kv::load(&*self.store, &key).await?.unwrap_or_default();
      history.insert(0, episode.clone());
      history.truncate(self.history_cap);
      kv::save(&*self.store, &key, &history).await?;
    }
    info!(episode_id = %episode.episode_id, "episode written to history");

    if !online {
      self.enqueue(&episode).await?;
      info!(episode_id = %episode.episode_id, "offline; episode queued for sync");
      return Ok(episode);
    }

    match self.uplink.acknowledge(&episode).await {
      Ok(()) => {
        self.mark_synced(&episode.user_id, &[episode.episode_id]).await?;
        episode.mark_synced();
        info!(episode_id = %episode.episode_id, "episode acknowledged");
      }
      Err(e) => {
        warn!(episode_id = %episode.episode_id, error = %e, "uplink failed; queueing episode");
        self.enqueue(&episode).await?;
      }
    }
    Ok(episode)
  }

  /// Push every queued episode belonging to `user_id` through the uplink.
  ///
  /// Acknowledged entries leave the queue and are marked synced in history;
  /// failures stay queued in their original order. Other users' entries are
  /// untouched. Returns the number of episodes synced.
  pub async fn sync_pending_logs(&self, user_id: &str) -> Result<usize> {
    if user_id.is_empty() {
      return Ok(0);
    }

    let queued: Vec<Episode> = kv::load(&*self.store, keys::PENDING_QUEUE)
      .await?
      .unwrap_or_default();
    let mine: Vec<&Episode> = queued.iter().filter(|e| e.user_id == user_id).collect();
    if mine.is_empty() {
      return Ok(0);
    }

    let mut acked = Vec::with_capacity(mine.len());
    for episode in mine {
      match self.uplink.acknowledge(episode).await {
        Ok(()) => acked.push(episode.episode_id),
        Err(e) => {
          warn!(episode_id = %episode.episode_id, error = %e, "sync failed; will retry");
        }
      }
    }
    if acked.is_empty() {
      return Ok(0);
    }

    {
      let _guard = self.write_lock.lock().await;
      let mut queue: Vec<Episode> = kv::load(&*self.store, keys::PENDING_QUEUE)
        .await?
        .unwrap_or_default();
      queue.retain(|e| !acked.contains(&e.episode_id));
      kv::save(&*self.store, keys::PENDING_QUEUE, &queue).await?;
    }
    self.mark_synced(user_id, &acked).await?;

    info!(user_id, synced = acked.len(), "pending episodes synced");
    Ok(acked.len())
  }

  /// The user's episodes, most recent first. An empty id has no history.
  pub async fn history(&self, user_id: &str) -> Result<Vec<Episode>> {
    if user_id.is_empty() {
      return Ok(Vec::new());
    }
    let mut history: Vec<Episode> = kv::load(&*self.store, &keys::history(user_id))
      .await?
      .unwrap_or_default();
    history.truncate(self.history_cap);
    Ok(history)
  }

  /// Append a dialed number to a logged episode, in history and in the
  /// pending queue if it is still there. Returns whether the episode exists.
  pub async fn append_dialed(
    &self,
    user_id: &str,
    episode_id: Uuid,
    number: PhoneNumber,
  ) -> Result<bool> {
    let _guard = self.write_lock.lock().await;

    let key = keys::history(user_id);
    let mut history: Vec<Episode> = kv::load(&*self.store, &key).await?.unwrap_or_default();
    let Some(entry) = history.iter_mut().find(|e| e.episode_id == episode_id) else {
      return Ok(false);
    };
    entry.append_dialed(number.clone());
    kv::save(&*self.store, &key, &history).await?;

    let mut queue: Vec<Episode> = kv::load(&*self.store, keys::PENDING_QUEUE)
      .await?
      .unwrap_or_default();
    if let Some(queued) = queue.iter_mut().find(|e| e.episode_id == episode_id) {
      queued.append_dialed(number);
      kv::save(&*self.store, keys::PENDING_QUEUE, &queue).await?;
    }
    Ok(true)
  }

  /// Number of episodes, across all users, still awaiting acknowledgment.
  pub async fn pending_count(&self) -> Result<usize> {
    let queue: Vec<Episode> = kv::load(&*self.store, keys::PENDING_QUEUE)
      .await?
      .unwrap_or_default();
    Ok(queue.len())
  }

  async fn enqueue(&self, episode: &Episode) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    let mut queue: Vec<Episode> = kv::load(&*self.store, keys::PENDING_QUEUE)
      .await?
      .unwrap_or_default();
    if !queue.iter().any(|e| e.episode_id == episode.episode_id) {
      queue.push(episode.clone());
    }
    kv::save(&*self.store, keys::PENDING_QUEUE, &queue).await
  }

  async fn mark_synced(&self, user_id: &str, ids: &[Uuid]) -> Result<()> {
    let _guard = self.write_lock.lock().await;
    let key = keys::history(user_id);
    let mut history: Vec<Episode> = kv::load(&*self.store, &key).await?.unwrap_or_default();
    let mut changed = false;
    for entry in history.iter_mut().filter(|e| ids.contains(&e.episode_id)) {
      if entry.status == SyncStatus::Pending {
        entry.mark_synced();
        changed = true;
      }
    }
    if changed {
      kv::save(&*self.store, &key, &history).await?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use shield_core::{location::Location, store::MemoryStore};
  use shield_store_sqlite::SqliteStore;

  use super::*;
  use crate::testing::FakeUplink;

  fn new_episode(user: &str) -> NewEpisode {
    NewEpisode {
      user_id:          user.into(),
      user_name:        "Asha".into(),
      location:         Location::new(12.9716, 77.5946),
      address:          "MG Road".into(),
      dialed_numbers:   vec![PhoneNumber::service("112").unwrap()],
      contact_outcomes: vec![],
      evidence:         None,
    }
  }

  fn logger<S: KvStore>(store: Arc<S>, uplink: Arc<FakeUplink>) -> ForensicLogger<S> {
    ForensicLogger::new(store, uplink, HISTORY_CAP)
  }

  #[tokio::test]
  async fn offline_episode_is_written_then_queued() {
    let store = Arc::new(MemoryStore::new());
    let uplink = Arc::new(FakeUplink::default());
    let log = logger(store.clone(), uplink.clone());

    let ep = log.log_episode(new_episode("u1"), false).await.unwrap();

    assert_eq!(ep.status, SyncStatus::Pending);
    assert_eq!(log.history("u1").await.unwrap(), vec![ep]);
    assert_eq!(log.pending_count().await.unwrap(), 1);
    assert!(uplink.acked().is_empty());
  }

  #[tokio::test]
  async fn uplink_failure_still_leaves_history_entry() {
    let store = Arc::new(MemoryStore::new());
    let uplink = Arc::new(FakeUplink::default());
    uplink.set_failing(true);
    let log = logger(store, uplink);

    let ep = log.log_episode(new_episode("u1"), true).await.unwrap();

    assert_eq!(ep.status, SyncStatus::Pending);
    assert_eq!(log.history("u1").await.unwrap().len(), 1);
    assert_eq!(log.pending_count().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn online_ack_marks_synced() {
    let store = Arc::new(MemoryStore::new());
    let uplink = Arc::new(FakeUplink::default());
    let log = logger(store, uplink.clone());

    let ep = log.log_episode(new_episode("u1"), true).await.unwrap();

    assert_eq!(ep.status, SyncStatus::Synced);
    assert_eq!(log.history("u1").await.unwrap()[0].status, SyncStatus::Synced);
    assert_eq!(log.pending_count().await.unwrap(), 0);
    assert_eq!(uplink.acked(), vec![ep.episode_id]);
  }

  #[tokio::test]
  async fn sync_drains_only_the_given_user() {
    let store = Arc::new(MemoryStore::new());
    let uplink = Arc::new(FakeUplink::default());
    let log = logger(store, uplink);

    let a1 = log.log_episode(new_episode("a"), false).await.unwrap();
    let b1 = log.log_episode(new_episode("b"), false).await.unwrap();
    let a2 = log.log_episode(new_episode("a"), false).await.unwrap();

    assert_eq!(log.sync_pending_logs("a").await.unwrap(), 2);
    assert_eq!(log.sync_pending_logs("a").await.unwrap(), 0, "idempotent");
    assert_eq!(log.pending_count().await.unwrap(), 1);

    let history = log.history("a").await.unwrap();
    assert_eq!(
      history.iter().map(|e| e.episode_id).collect::<Vec<_>>(),
      vec![a2.episode_id, a1.episode_id],
      "order preserved, nothing duplicated"
    );
    assert!(history.iter().all(|e| e.status == SyncStatus::Synced));
    assert_eq!(log.history("b").await.unwrap()[0].episode_id, b1.episode_id);
    assert_eq!(log.history("b").await.unwrap()[0].status, SyncStatus::Pending);
  }

  #[tokio::test]
  async fn failed_sync_keeps_entries_queued() {
    let store = Arc::new(MemoryStore::new());
    let uplink = Arc::new(FakeUplink::default());
    let log = logger(store, uplink.clone());
    log.log_episode(new_episode("a"), false).await.unwrap();

    uplink.set_failing(true);
    assert_eq!(log.sync_pending_logs("a").await.unwrap(), 0);
    assert_eq!(log.pending_count().await.unwrap(), 1);

    uplink.set_failing(false);
    assert_eq!(log.sync_pending_logs("a").await.unwrap(), 1);
    assert_eq!(log.pending_count().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn history_is_capped_at_most_recent() {
    let store = Arc::new(MemoryStore::new());
    let log = logger(store, Arc::new(FakeUplink::default()));

    let mut ids = Vec::new();
    for _ in 0..105 {
      ids.push(log.log_episode(new_episode("u1"), true).await.unwrap().episode_id);
    }

    let history = log.history("u1").await.unwrap();
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].episode_id, ids[104]);
    assert_eq!(history[99].episode_id, ids[5]);
  }

  #[tokio::test]
  async fn history_is_user_scoped() {
    let store = Arc::new(MemoryStore::new());
    let log = logger(store, Arc::new(FakeUplink::default()));
    log.log_episode(new_episode("a"), true).await.unwrap();

    assert!(log.history("b").await.unwrap().is_empty());
    assert!(log.history("").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn append_dialed_updates_history_and_queue() {
    let store = Arc::new(MemoryStore::new());
    let uplink = Arc::new(FakeUplink::default());
    let log = logger(store, uplink.clone());
    let ep = log.log_episode(new_episode("u1"), false).await.unwrap();

    let extra = PhoneNumber::parse("9876543210", &Default::default()).unwrap();
    assert!(log.append_dialed("u1", ep.episode_id, extra.clone()).await.unwrap());
    assert!(!log.append_dialed("u1", Uuid::new_v4(), extra.clone()).await.unwrap());

    let logged = &log.history("u1").await.unwrap()[0];
    assert_eq!(logged.dialed_numbers.last(), Some(&extra));

    log.sync_pending_logs("u1").await.unwrap();
    assert_eq!(uplink.acked_episodes()[0].dialed_numbers.len(), 2);
  }

  #[tokio::test]
  async fn sqlite_backed_log_survives_queue_round_trip() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let uplink = Arc::new(FakeUplink::default());
    let log = logger(store, uplink);

    let ep = log.log_episode(new_episode("u1"), false).await.unwrap();
    assert_eq!(log.sync_pending_logs("u1").await.unwrap(), 1);
    assert_eq!(log.history("u1").await.unwrap()[0].episode_id, ep.episode_id);
  }
}
