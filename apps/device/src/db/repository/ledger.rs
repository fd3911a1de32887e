use async_trait::async_trait;
use mintyflow_core::{
    Millis, RecurrenceInterval, SyncAction, Transaction, TransactionKind, Wallet, WalletKind,
    TRANSACTION_PAGE_SIZE,
};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tracing::debug;

use super::{
    assign_id, enqueue_change, not_found, Result, SqliteRepository, TransactionRepository, WalletRepository,
};
use crate::db::codec::{
    decimal_at, decode_bool, decode_string_list, encode_bool, encode_decimal, encode_string_list,
    enum_at, optional_enum_at,
};
use crate::db::error::DbError;
use crate::db::now_millis;

const WALLET_COLUMNS: &str =
    "id, userId, name, type, balance, currency, createdAt, updatedAt, sharedWith, isEncrypted";

const TRANSACTION_COLUMNS: &str = "id, userId, walletId, type, amount, categoryId, description, \
     notes, date, createdAt, updatedAt, recurringInterval, toWalletId";

fn row_to_wallet(row: &rusqlite::Row) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        kind: enum_at(row, 3, WalletKind::parse)?,
        balance: decimal_at(row, 4)?,
        currency: row.get(5)?,
        created_at: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        updated_at: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        shared_with: decode_string_list(row.get(8)?),
        is_encrypted: decode_bool(row.get(9)?),
    })
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        wallet_id: row.get(2)?,
        kind: enum_at(row, 3, TransactionKind::parse)?,
        amount: decimal_at(row, 4)?,
        category_id: row.get(5)?,
        description: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        notes: row.get(7)?,
        date: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        created_at: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
        updated_at: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
        recurring_interval: optional_enum_at(row, 11, RecurrenceInterval::parse)?,
        to_wallet_id: row.get(12)?,
    })
}

fn load_wallet(conn: &Connection, id: &str) -> Result<Option<Wallet>> {
    let wallet = conn
        .query_row(
            &format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = ?1"),
            params![id],
            row_to_wallet,
        )
        .optional()?;
    Ok(wallet)
}

fn load_transaction(conn: &Connection, id: &str) -> Result<Option<Transaction>> {
    let tx = conn
        .query_row(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
            params![id],
            row_to_transaction,
        )
        .optional()?;
    Ok(tx)
}

/// Apply `delta` to a wallet balance owned by `user_id` and record the change in the outbox.
fn adjust_balance(
    conn: &Connection,
    wallet_id: &str,
    user_id: &str,
    delta: Decimal,
    now: Millis,
) -> Result<Wallet> {
    let mut wallet = load_wallet(conn, wallet_id)?.ok_or_else(|| not_found("wallet", wallet_id))?;
    if wallet.user_id != user_id {
        return Err(DbError::InvalidData(format!(
            "wallet {wallet_id} does not belong to user {user_id}"
        )));
    }
    wallet.balance += delta;
    wallet.updated_at = now;
    conn.execute(
        "UPDATE wallets SET balance = ?2, updatedAt = ?3 WHERE id = ?1",
        params![wallet.id, encode_decimal(wallet.balance), now],
    )?;
    enqueue_change(conn, user_id, "wallets", &wallet.id, SyncAction::Update, &wallet, now)?;
    Ok(wallet)
}

fn query_transactions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[async_trait]
impl WalletRepository for SqliteRepository {
    async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet> {
        let mut wallet = wallet.clone();
        assign_id(&mut wallet.id);
        wallet.validate()?;
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    &format!("INSERT INTO wallets ({WALLET_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                    params![
                        wallet.id,
                        wallet.user_id,
                        wallet.name,
                        wallet.kind.as_str(),
                        encode_decimal(wallet.balance),
                        wallet.currency,
                        wallet.created_at,
                        wallet.updated_at,
                        encode_string_list(&wallet.shared_with),
                        encode_bool(wallet.is_encrypted),
                    ],
                )?;
                enqueue_change(conn, &wallet.user_id, "wallets", &wallet.id, SyncAction::Insert, &wallet, now)?;
                Ok(wallet)
            })
            .await
    }

    async fn get_wallet(&self, id: &str) -> Result<Option<Wallet>> {
        self.store.read(move |conn| load_wallet(conn, id)).await
    }

    async fn list_wallets(&self, user_id: &str) -> Result<Vec<Wallet>> {
        self.store
            .read(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {WALLET_COLUMNS} FROM wallets WHERE userId = ?1 ORDER BY createdAt, id"
                ))?;
                let wallets = stmt
                    .query_map(params![user_id], row_to_wallet)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(wallets)
            })
            .await
    }

    async fn delete_wallet(&self, id: &str) -> Result<()> {
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                let wallet = load_wallet(conn, id)?.ok_or_else(|| not_found("wallet", id))?;
                let referenced: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM transactions WHERE walletId = ?1 OR toWalletId = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                if referenced > 0 {
                    return Err(DbError::InvalidData(format!(
                        "wallet {id} still has {referenced} transactions"
                    )));
                }
                conn.execute("DELETE FROM wallets WHERE id = ?1", params![id])?;
                enqueue_change(conn, &wallet.user_id, "wallets", id, SyncAction::Delete, &wallet, now)?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl TransactionRepository for SqliteRepository {
    async fn add_transaction(&self, tx: &Transaction) -> Result<Transaction> {
        let mut tx = tx.clone();
        assign_id(&mut tx.id);
        tx.validate()?;
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO transactions ({TRANSACTION_COLUMNS}, category, isRecurring)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?6, ?14)"
                    ),
                    params![
                        tx.id,
                        tx.user_id,
                        tx.wallet_id,
                        tx.kind.as_str(),
                        encode_decimal(tx.amount),
                        tx.category_id,
                        tx.description,
                        tx.notes,
                        tx.date,
                        tx.created_at,
                        tx.updated_at,
                        tx.recurring_interval.map(|i| i.as_str()),
                        tx.to_wallet_id,
                        encode_bool(tx.is_recurring()),
                    ],
                )?;
                enqueue_change(conn, &tx.user_id, "transactions", &tx.id, SyncAction::Insert, &tx, now)?;

                adjust_balance(conn, &tx.wallet_id, &tx.user_id, tx.source_delta(), now)?;
                if let Some((destination, delta)) = tx.destination_delta() {
                    adjust_balance(conn, destination, &tx.user_id, delta, now)?;
                }
                debug!(id = %tx.id, kind = tx.kind.as_str(), "transaction applied");
                Ok(tx)
            })
            .await
    }

    async fn delete_transaction(&self, id: &str) -> Result<()> {
        let now = now_millis();
        self.store
            .transaction(move |conn| {
                let tx = load_transaction(conn, id)?.ok_or_else(|| not_found("transaction", id))?;
                adjust_balance(conn, &tx.wallet_id, &tx.user_id, -tx.source_delta(), now)?;
                if let Some((destination, delta)) = tx.destination_delta() {
                    adjust_balance(conn, destination, &tx.user_id, -delta, now)?;
                }
                conn.execute("DELETE FROM transactions WHERE id = ?1", params![id])?;
                enqueue_change(conn, &tx.user_id, "transactions", id, SyncAction::Delete, &tx, now)?;
                Ok(())
            })
            .await
    }

    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        self.store.read(move |conn| load_transaction(conn, id)).await
    }

    async fn list_transactions(&self, user_id: &str, page: u32) -> Result<Vec<Transaction>> {
        let limit = i64::from(TRANSACTION_PAGE_SIZE);
        let offset = i64::from(page) * limit;
        self.store
            .read(move |conn| {
                query_transactions(
                    conn,
                    &format!(
                        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE userId = ?1
                         ORDER BY date DESC, createdAt DESC LIMIT ?2 OFFSET ?3"
                    ),
                    params![user_id, limit, offset],
                )
            })
            .await
    }

    async fn transactions_between(
        &self,
        user_id: &str,
        from: Millis,
        to: Millis,
    ) -> Result<Vec<Transaction>> {
        self.store
            .read(move |conn| {
                query_transactions(
                    conn,
                    &format!(
                        "SELECT {TRANSACTION_COLUMNS} FROM transactions
                         WHERE userId = ?1 AND date >= ?2 AND date <= ?3
                         ORDER BY date DESC, createdAt DESC"
                    ),
                    params![user_id, from, to],
                )
            })
            .await
    }
}
