//! Outbox entries written by repository mutations and drained by the worker.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mintyflow_core::{SyncAction, SyncQueueEntry};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use common::*;
use mintyflow_lib::db::{
    SyncQueueRepository, TransactionRepository, UserRepository, WalletRepository,
};
use mintyflow_lib::sync::{DrainReport, OutboxTransport, OutboxWorker, SyncError};

#[derive(Default)]
struct RecordingTransport {
    delivered: Mutex<Vec<(String, String, SyncAction)>>,
    offline: Mutex<bool>,
}

#[async_trait]
impl OutboxTransport for RecordingTransport {
    async fn push(&self, entry: &SyncQueueEntry) -> Result<(), SyncError> {
        if *self.offline.lock().unwrap() {
            return Err(SyncError::Network("connection refused".to_string()));
        }
        self.delivered.lock().unwrap().push((
            entry.table_name.clone(),
            entry.record_id.clone(),
            entry.action,
        ));
        Ok(())
    }
}

#[tokio::test]
async fn test_mutations_are_queued_and_drained_in_order() {
    let ctx = TestContext::new().await;
    let repo = &ctx.state.repository;
    repo.upsert_user(&user("u1")).await.unwrap();
    repo.create_wallet(&wallet("w1", "u1", dec!(100))).await.unwrap();
    repo.add_transaction(&expense("t1", "u1", "w1", dec!(25)))
        .await
        .unwrap();

    let pending = repo.pending_entries(100).await.unwrap();
    assert!(pending.iter().all(|e| e.user_id.as_deref() == Some("u1")));
    assert_eq!(
        pending
            .iter()
            .map(|e| (e.table_name.as_str(), e.record_id.as_str(), e.action))
            .collect::<Vec<_>>(),
        vec![
            ("wallets", "w1", SyncAction::Insert),
            ("transactions", "t1", SyncAction::Insert),
            ("wallets", "w1", SyncAction::Update),
        ]
    );

    let transport = Arc::new(RecordingTransport::default());
    let worker = OutboxWorker::new(repo.clone(), transport.clone(), Duration::from_secs(30));

    *transport.offline.lock().unwrap() = true;
    let report = worker.drain_once().await.unwrap();
    assert_eq!(
        report,
        DrainReport {
            attempted: 1,
            synced: 0,
            failed: 1
        }
    );
    let pending = repo.pending_entries(100).await.unwrap();
    assert_eq!(pending.len(), 3);
    assert_eq!(pending[0].attempts, 1);

    *transport.offline.lock().unwrap() = false;
    let report = worker.drain_once().await.unwrap();
    assert_eq!(report.synced, 3);
    assert_eq!(transport.delivered.lock().unwrap().len(), 3);
    assert!(repo.pending_entries(100).await.unwrap().is_empty());

    // Synced rows stay in the table.
    assert_eq!(ctx.count("sync_queue", "u1").await, 3);
}

#[tokio::test]
async fn test_small_batches_drain_everything() {
    let ctx = TestContext::new().await;
    let repo = &ctx.state.repository;
    repo.upsert_user(&user("u1")).await.unwrap();
    for i in 0..5 {
        repo.create_wallet(&wallet(&format!("w{i}"), "u1", dec!(10)))
            .await
            .unwrap();
    }

    let transport = Arc::new(RecordingTransport::default());
    let worker = OutboxWorker::new(repo.clone(), transport.clone(), Duration::from_secs(30))
        .with_batch_size(2);

    let mut rounds = 0;
    while worker.drain_once().await.unwrap().attempted > 0 {
        rounds += 1;
    }
    assert_eq!(rounds, 3);
    let delivered: Vec<String> = transport
        .delivered
        .lock()
        .unwrap()
        .iter()
        .map(|(_, id, _)| id.clone())
        .collect();
    assert_eq!(delivered, vec!["w0", "w1", "w2", "w3", "w4"]);
}
