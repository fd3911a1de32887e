use async_trait::async_trait;
use mintyflow_core::{Millis, SyncAction, SyncQueueEntry};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::{Result, SqliteRepository, SyncQueueRepository};
use crate::db::codec::{decode_bool, enum_at};
use crate::db::error::DbError;
use crate::db::now_millis;

/// Append an outbox row for `record`. Call inside the transaction that made the change.
pub(crate) fn enqueue_change<T: Serialize>(
    conn: &Connection,
    user_id: &str,
    table_name: &str,
    record_id: &str,
    action: SyncAction,
    record: &T,
    now: Millis,
) -> Result<i64> {
    let data = serde_json::to_string(record)
        .map_err(|e| DbError::InvalidData(format!("cannot encode {table_name} {record_id}: {e}")))?;
    conn.execute(
        "INSERT INTO sync_queue (userId, table_name, record_id, action, data, timestamp, synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![user_id, table_name, record_id, action.as_str(), data, now],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<SyncQueueEntry> {
    Ok(SyncQueueEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        table_name: row.get(2)?,
        record_id: row.get(3)?,
        action: enum_at(row, 4, SyncAction::parse)?,
        data: row.get(5)?,
        timestamp: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        synced: decode_bool(row.get(7)?),
        attempts: row.get::<_, Option<u32>>(8)?.unwrap_or(0),
        last_error: row.get(9)?,
    })
}

#[async_trait]
impl SyncQueueRepository for SqliteRepository {
    async fn enqueue(
        &self,
        user_id: &str,
        table_name: &str,
        record_id: &str,
        action: SyncAction,
        data: serde_json::Value,
    ) -> Result<i64> {
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                enqueue_change(conn, user_id, table_name, record_id, action, &data, now)
            })
            .await
    }

    async fn pending_entries(&self, limit: usize) -> Result<Vec<SyncQueueEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.store
            .read(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, userId, table_name, record_id, action, data, timestamp, synced, attempts, lastError
                     FROM sync_queue WHERE synced = 0 ORDER BY id LIMIT ?1",
                )?;
                let entries = stmt
                    .query_map(params![limit], row_to_entry)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
    }

    async fn mark_synced(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.store
            .transaction(move |conn| {
                let mut stmt = conn.prepare("UPDATE sync_queue SET synced = 1, lastError = NULL WHERE id = ?1")?;
                let mut updated = 0;
                for id in ids {
                    updated += stmt.execute(params![id])?;
                }
                Ok(updated)
            })
            .await
    }

    async fn record_sync_failure(&self, id: i64, error: &str) -> Result<()> {
        self.store
            .read(move |conn| {
                conn.execute(
                    "UPDATE sync_queue SET attempts = attempts + 1, lastError = ?2 WHERE id = ?1",
                    params![id, error],
                )?;
                Ok(())
            })
            .await
    }
}
