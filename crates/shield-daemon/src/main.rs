//! shield daemon.
//!
//! Reads `shield.toml` (or the path given with `--config`) layered with
//! `SHIELD_*` environment variables, opens the SQLite store, wires the host
//! platform adapters into an orchestrator, and serves the JSON API.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `SHIELD_REMOTE__RELAY_URL`.

mod config;
mod device;
mod remote;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use shield_core::{
  location::Location,
  ports::{AddressResolver, CloudMessenger, HelpOracle, LogUplink},
};
use shield_dispatch::{Orchestrator, Platform};
use shield_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use crate::{
  config::DaemonConfig,
  device::{
    ConfiguredIdentity, ExternalRecognizer, FixedLocation, LoggingComposer, LoggingDialer,
    LoggingRecorder, LoggingSiren, LoggingSpeech, SharedConnectivity,
  },
  remote::{HttpGeocoder, HttpPlaces, HttpRelay, HttpUplink, Remote, Unconfigured},
};

#[derive(Parser)]
#[command(author, version, about = "Shield SOS dispatch daemon")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "shield.toml")]
  config: PathBuf,

  /// Override the listen port.
  #[arg(short, long)]
  port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = ::config::Config::builder()
    .add_source(::config::File::from(cli.config).required(false))
    .add_source(
      ::config::Environment::with_prefix("SHIELD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let mut cfg: DaemonConfig = settings
    .try_deserialize()
    .context("failed to deserialise DaemonConfig")?;
  if let Some(port) = cli.port {
    cfg.port = port;
  }

  let store_path = expand_tilde(&cfg.store_path);
  if let Some(parent) = store_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let remote = Remote::new(Duration::from_secs(cfg.remote.timeout_secs), cfg.remote.api_key.clone())?;
  let connectivity = Arc::new(SharedConnectivity::new(cfg.device.online));
  let platform = build_platform(&cfg, &remote, connectivity.clone());

  let orch = Orchestrator::new(Arc::new(store), platform, cfg.orchestrator_config());
  match orch.arm_triggers().await {
    Ok(voice) => info!(?voice, "triggers armed"),
    Err(e) => warn!(error = %e, "triggers not armed"),
  }

  let cancel = CancellationToken::new();
  let mut tasks = vec![orch.spawn_connectivity_monitor(cancel.clone())];
  if let Some(url) = cfg.remote.relay_url.clone() {
    tasks.push(remote::spawn_reachability_probe(
      remote.clone(),
      url,
      connectivity,
      Duration::from_secs(cfg.remote.probe_every_secs),
      cancel.clone(),
    ));
  }

  let app = Router::new()
    .nest("/api", shield_api::api_router(orch))
    .layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", cfg.host, cfg.port);

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  let shutdown = cancel.clone();
  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      if tokio::signal::ctrl_c().await.is_err() {
        warn!("ctrl-c handler unavailable");
        std::future::pending::<()>().await;
      }
      info!("shutting down");
      shutdown.cancel();
    })
    .await
    .context("server error")?;

  cancel.cancel();
  for task in tasks {
    let _ = task.await;
  }
  Ok(())
}

fn build_platform(cfg: &DaemonConfig, remote: &Remote, connectivity: Arc<SharedConnectivity>) -> Platform {
  let r = &cfg.remote;
  let cloud: Arc<dyn CloudMessenger> = match &r.relay_url {
    Some(url) => Arc::new(HttpRelay::new(remote.clone(), url.clone())),
    None => Arc::new(Unconfigured("relay")),
  };
  let uplink: Arc<dyn LogUplink> = match &r.uplink_url {
    Some(url) => Arc::new(HttpUplink::new(remote.clone(), url.clone())),
    None => Arc::new(Unconfigured("uplink")),
  };
  let help: Arc<dyn HelpOracle> = match &r.places_url {
    Some(url) => Arc::new(HttpPlaces::new(remote.clone(), url.clone())),
    None => Arc::new(Unconfigured("places")),
  };
  let address: Arc<dyn AddressResolver> = match &r.geocode_url {
    Some(url) => Arc::new(HttpGeocoder::new(remote.clone(), url.clone())),
    None => Arc::new(Unconfigured("geocode")),
  };
  let fixed = match (cfg.device.latitude, cfg.device.longitude) {
    (Some(lat), Some(lng)) => Some(Location::new(lat, lng)),
    _ => None,
  };

  Platform {
    identity: Arc::new(ConfiguredIdentity::new(&cfg.user.user_id, &cfg.user.display_name)),
    location: Arc::new(FixedLocation(fixed)),
    address,
    help,
    cloud,
    uplink,
    evidence: Arc::new(LoggingRecorder::default()),
    dialer: Arc::new(LoggingDialer),
    composer: Arc::new(LoggingComposer),
    siren: Arc::new(LoggingSiren),
    speech: Arc::new(LoggingSpeech),
    recognizer: Arc::new(ExternalRecognizer),
    connectivity,
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
