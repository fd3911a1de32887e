//! Startup sequencing: the store is initialized before any consumer runs.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use crate::db::{DbError, LocalStore};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("storage initialization failed: {0}")]
    Storage(#[from] DbError),

    #[error("storage initialization timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum BootstrapStatus {
    Initializing,
    Ready,
    Failed { reason: String },
}

pub struct Bootstrap {
    store: Arc<LocalStore>,
    status: watch::Sender<BootstrapStatus>,
}

impl Bootstrap {
    pub fn new(store: Arc<LocalStore>) -> Self {
        let (status, _) = watch::channel(BootstrapStatus::Initializing);
        Self { store, status }
    }

    pub fn status(&self) -> BootstrapStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BootstrapStatus> {
        self.status.subscribe()
    }

    /// Initialize the store, giving up after `timeout`.
    pub async fn run(&self, timeout: Duration) -> Result<Arc<LocalStore>, BootstrapError> {
        info!(location = %self.store.location(), "initializing local store");
        self.status.send_replace(BootstrapStatus::Initializing);

        let outcome = match tokio::time::timeout(timeout, self.store.initialize()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BootstrapError::Storage(e)),
            Err(_) => Err(BootstrapError::TimedOut(timeout)),
        };

        match outcome {
            Ok(()) => {
                info!("bootstrap complete");
                self.status.send_replace(BootstrapStatus::Ready);
                Ok(Arc::clone(&self.store))
            }
            Err(e) => {
                error!(error = %e, "bootstrap failed");
                self.status.send_replace(BootstrapStatus::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Wait until bootstrap leaves `Initializing`; returns the terminal status.
    pub async fn wait_ready(&self) -> BootstrapStatus {
        let mut rx = self.status.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let terminal = match rx
            .wait_for(|status| *status != BootstrapStatus::Initializing)
            .await
        {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        };
        terminal
    }
}
