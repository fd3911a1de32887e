//! Outbox drain: pushes pending `sync_queue` rows to the backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mintyflow_core::{ExponentialBackoff, Millis, RetryPolicy, SyncAction, SyncQueueEntry};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::db::{DbError, SqliteRepository, SyncQueueRepository};

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<DbError> for SyncError {
    fn from(e: DbError) -> Self {
        SyncError::Database(e.to_string())
    }
}

/// Destination for outbox entries.
#[async_trait]
pub trait OutboxTransport: Send + Sync {
    /// Deliver one entry. `Ok` means the backend acknowledged it.
    async fn push(&self, entry: &SyncQueueEntry) -> Result<(), SyncError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboxPayload<'a> {
    id: i64,
    user_id: Option<&'a str>,
    record_id: &'a str,
    action: SyncAction,
    data: serde_json::Value,
    timestamp: Millis,
}

/// Posts each entry as JSON to `{base_url}/sync/{table_name}`.
#[derive(Clone)]
pub struct HttpOutboxTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpOutboxTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, table_name: &str) -> String {
        format!("{}/sync/{}", self.base_url, table_name)
    }
}

#[async_trait]
impl OutboxTransport for HttpOutboxTransport {
    async fn push(&self, entry: &SyncQueueEntry) -> Result<(), SyncError> {
        let data: serde_json::Value =
            serde_json::from_str(&entry.data).map_err(|e| SyncError::Parse(e.to_string()))?;
        let payload = OutboxPayload {
            id: entry.id,
            user_id: entry.user_id.as_deref(),
            record_id: &entry.record_id,
            action: entry.action,
            data,
            timestamp: entry.timestamp,
        };

        let mut request = self.client.post(self.url(&entry.table_name)).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(SyncError::Backend { status, message });
        }
        Ok(())
    }
}

/// Outcome of one drain round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

pub struct OutboxWorker {
    repo: SqliteRepository,
    transport: Arc<dyn OutboxTransport>,
    batch_size: usize,
    interval: Duration,
    backoff: ExponentialBackoff,
}

impl OutboxWorker {
    pub const DEFAULT_BATCH_SIZE: usize = 100;

    pub fn new(repo: SqliteRepository, transport: Arc<dyn OutboxTransport>, interval: Duration) -> Self {
        Self {
            repo,
            transport,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            interval,
            backoff: ExponentialBackoff::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Push one batch of pending entries, oldest first.
    ///
    /// Stops at the first rejected entry so later changes to the same record
    /// never overtake it. Acknowledged entries are marked synced; the rejected
    /// one keeps its row with the failure recorded.
    pub async fn drain_once(&self) -> Result<DrainReport, SyncError> {
        let entries = self.repo.pending_entries(self.batch_size).await?;
        let mut report = DrainReport::default();
        let mut acknowledged = Vec::with_capacity(entries.len());

        for entry in &entries {
            report.attempted += 1;
            match self.transport.push(entry).await {
                Ok(()) => acknowledged.push(entry.id),
                Err(e) => {
                    warn!(
                        id = entry.id,
                        table = %entry.table_name,
                        record = %entry.record_id,
                        error = %e,
                        "outbox entry rejected"
                    );
                    self.repo.record_sync_failure(entry.id, &e.to_string()).await?;
                    report.failed += 1;
                    break;
                }
            }
        }

        report.synced = self.repo.mark_synced(&acknowledged).await?;
        debug!(?report, "outbox drain round finished");
        Ok(report)
    }

    /// Drain until `shutdown` turns true (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "outbox worker started");
        let mut failures = 0u32;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.drain_once().await {
                Ok(report) if report.failed == 0 => {
                    failures = 0;
                    if report.synced > 0 {
                        info!(synced = report.synced, "outbox entries synced");
                    }
                    if report.attempted == self.batch_size {
                        Duration::ZERO
                    } else {
                        self.interval
                    }
                }
                Ok(report) => {
                    failures = failures.saturating_add(1);
                    info!(synced = report.synced, failures, "outbox drain paused after rejection");
                    self.backoff.delay_for(failures)
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    error!(error = %e, failures, "outbox drain failed");
                    self.backoff.delay_for(failures)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("outbox worker stopped");
    }
}
