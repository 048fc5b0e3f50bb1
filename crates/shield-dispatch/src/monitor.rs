//! Connectivity monitor: re-evaluates the network periodically and on demand,
//! publishes the result, and flushes queued episodes once back online.

use std::{sync::Arc, time::Duration};

use shield_core::{network::NetworkStatus, ports::IdentityProvider, store::KvStore};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{forensic::ForensicLogger, telephony::Actuators};

pub struct ConnectivityMonitor<S> {
  actuators: Actuators,
  logger:    Arc<ForensicLogger<S>>,
  identity:  Arc<dyn IdentityProvider>,
  status:    watch::Sender<NetworkStatus>,
}

impl<S> ConnectivityMonitor<S>
where
  S: KvStore + 'static,
{
  pub fn new(
    actuators: Actuators,
    logger: Arc<ForensicLogger<S>>,
    identity: Arc<dyn IdentityProvider>,
  ) -> Self {
    let (status, _) = watch::channel(actuators.network_intelligence());
    Self { actuators, logger, identity, status }
  }

  /// Classify the current reading and publish it.
  pub fn observe(&self) -> NetworkStatus {
    let next = self.actuators.network_intelligence();
    let previous = self.status.send_replace(next.clone());
    if previous.online != next.online {
      info!(online = next.online, level = next.signal_level, "connectivity changed");
    }
    next
  }

  /// Last published status.
  pub fn current(&self) -> NetworkStatus { self.status.borrow().clone() }

  pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> { self.status.subscribe() }

  /// [`observe`](Self::observe), then sync the signed-in user's pending
  /// episodes if online. Sync failures are logged, never returned.
  pub async fn refresh(&self) -> NetworkStatus {
    let status = self.observe();
    if !status.online {
      return status;
    }
    let Some(user) = self.identity.current_user() else {
      return status;
    };
    match self.logger.sync_pending_logs(&user.user_id).await {
      Ok(0) => {}
      Ok(n) => debug!(synced = n, "flushed pending episodes"),
      Err(e) => warn!(error = %e, "pending episode sync failed"),
    }
    status
  }

  /// Run [`refresh`](Self::refresh) every `every` until `cancel` fires.
  pub fn spawn(self: Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
      loop {
        self.refresh().await;
        tokio::select! {
          _ = cancel.cancelled() => break,
          _ = tokio::time::sleep(every) => {}
        }
      }
      debug!("connectivity monitor stopped");
    })
  }
}

#[cfg(test)]
mod tests {
  use shield_core::{
    contact::PhoneNumber,
    episode::NewEpisode,
    location::Location,
    network::ConnectivitySignal,
    store::MemoryStore,
  };

  use super::*;
  use crate::{
    forensic::HISTORY_CAP,
    telephony::ActuatorConfig,
    testing::{FakeDevices, FakeIdentity, FakeUplink, settle},
  };

  fn episode(user: &str) -> NewEpisode {
    NewEpisode {
      user_id:          user.into(),
      user_name:        "Asha".into(),
      location:         Location::new(1.0, 2.0),
      address:          "1.0000, 2.0000".into(),
      dialed_numbers:   vec![PhoneNumber::service("112").unwrap()],
      contact_outcomes: vec![],
      evidence:         None,
    }
  }

  #[tokio::test(start_paused = true)]
  async fn reconnect_flushes_queue_and_publishes() {
    let dev = FakeDevices::online();
    dev.probe.set(ConnectivitySignal::offline());
    let actuators = Actuators::new(
      dev.dialer.clone(),
      dev.siren.clone(),
      dev.speech.clone(),
      dev.probe.clone(),
      ActuatorConfig::default(),
    );
    let logger = Arc::new(ForensicLogger::new(
      Arc::new(MemoryStore::new()),
      Arc::new(FakeUplink::default()),
      HISTORY_CAP,
    ));
    logger.log_episode(episode("u1"), false).await.unwrap();

    let monitor = Arc::new(ConnectivityMonitor::new(
      actuators,
      logger.clone(),
      Arc::new(FakeIdentity::signed_in("u1", "Asha")),
    ));
    let mut rx = monitor.subscribe();
    let cancel = CancellationToken::new();
    let handle = monitor.clone().spawn(Duration::from_secs(5), cancel.clone());

    settle().await;
    assert!(!monitor.current().online);
    assert_eq!(logger.pending_count().await.unwrap(), 1);

    dev.probe.set(ConnectivitySignal::online());
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;

    assert!(rx.borrow_and_update().online);
    assert_eq!(logger.pending_count().await.unwrap(), 0);

    cancel.cancel();
    handle.await.unwrap();
  }
}
