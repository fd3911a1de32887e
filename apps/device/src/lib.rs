pub mod bootstrap;
pub mod config;
pub mod db;
pub mod session;
pub mod settings;
pub mod state;
pub mod sync;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bootstrap::Bootstrap;
use crate::config::AppConfig;
use crate::db::LocalStore;
use crate::session::{HttpProfileStore, JsonFileCache, NoBiometrics};
use crate::state::AppState;
use crate::sync::{HttpOutboxTransport, OutboxWorker};

/// Bootstrap the local store and drain the outbox until interrupted.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(data_dir = %config.data_dir.display(), "starting mintyflow");

    let bootstrap = Bootstrap::new(Arc::new(LocalStore::new(&config.data_dir)));
    let store = bootstrap.run(config.bootstrap_timeout).await?;

    let mut state = AppState::new(
        store,
        Arc::new(JsonFileCache::new(&config.data_dir)),
        Arc::new(NoBiometrics),
    );
    if let Some(url) = &config.profile_api_url {
        let mut profiles = HttpProfileStore::new(url);
        if let Some(token) = &config.api_token {
            profiles = profiles.with_token(token);
        }
        state = state.with_profile_store(Arc::new(profiles));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = match &config.sync_api_url {
        Some(url) => {
            let mut transport = HttpOutboxTransport::new(url);
            if let Some(token) = &config.api_token {
                transport = transport.with_token(token);
            }
            let worker = OutboxWorker::new(
                state.repository.clone(),
                Arc::new(transport),
                config.outbox_interval,
            );
            Some(tokio::spawn(async move { worker.run(shutdown_rx).await }))
        }
        None => {
            info!("MINTYFLOW_SYNC_API_URL not set, outbox drain disabled");
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    shutdown_tx.send_replace(true);
    if let Some(handle) = worker {
        handle.await?;
    }
    state.store.shutdown().await;
    Ok(())
}
