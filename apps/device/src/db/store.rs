//! Single-connection SQLite store shared by every repository.

use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::DbError;
use super::schema::{DB_FILE_NAME, MIGRATIONS, SCHEMA_VERSION_TABLE, WIPE_ORDER};

type Result<T> = std::result::Result<T, DbError>;

/// Owned positional parameters for the generic query helpers.
pub type SqlParams = Vec<Value>;

/// Build [`SqlParams`] from anything convertible into a SQLite value.
#[macro_export]
macro_rules! sql_params {
    ($($value:expr),* $(,)?) => {
        vec![$(::rusqlite::types::Value::from($value)),*]
    };
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// How long a statement waits on another connection's lock before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory => f.write_str(":memory:"),
        }
    }
}

/// Local relational store.
///
/// Holds at most one open connection. Every statement goes through the async
/// mutex, so calls are applied strictly in the order they acquire it.
pub struct LocalStore {
    location: StoreLocation,
    conn: Mutex<Option<Connection>>,
}

impl fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Store backed by `mintyflow.db` inside `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self::at_path(data_dir.as_ref().join(DB_FILE_NAME))
    }

    /// Store backed by an explicit database file.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            conn: Mutex::new(None),
        }
    }

    /// Store that lives only as long as the process (for testing).
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            conn: Mutex::new(None),
        }
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub async fn is_initialized(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Open the database and bring the schema up to date. Safe to call again.
    ///
    /// Opening and migrating run on the blocking pool, so a caller's timeout
    /// can fire while SQLite waits on a lock.
    pub async fn initialize(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if guard.is_some() {
            debug!(location = %self.location, "local store already initialized");
            return Ok(());
        }

        let location = self.location.clone();
        let opened = tokio::task::spawn_blocking(move || open_connection(&location))
            .await
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)
            .and_then(|opened| opened);
        let conn = opened.map_err(|source| DbError::StorageInit {
            path: self.location.to_string(),
            source,
        })?;
        *guard = Some(conn);
        Ok(())
    }

    /// Close the connection. Later calls fail with [`DbError::NotInitialized`].
    pub async fn shutdown(&self) {
        if let Some(conn) = self.conn.lock().await.take() {
            if let Err((_, e)) = conn.close() {
                warn!(error = %e, "failed to close local store cleanly");
            }
        }
    }

    /// Run `f` against the open connection.
    pub async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send,
        T: Send,
    {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DbError::NotInitialized)?;
        f(conn)
    }

    /// Run `f` inside an immediate transaction: committed on `Ok`, rolled back on `Err`.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send,
        T: Send,
    {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DbError::NotInitialized)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Insert, update or delete. Returns the number of affected rows.
    pub async fn execute(&self, sql: &str, params: SqlParams) -> Result<usize> {
        self.read(move |conn| Ok(conn.execute(sql, params_from_iter(params))?))
            .await
    }

    /// Every row produced by `sql`, mapped by `map`.
    pub async fn query_all<T, F>(&self, sql: &str, params: SqlParams, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T> + Send,
        T: Send,
    {
        self.read(move |conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), map)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// First row produced by `sql`, or `None` when there is none.
    pub async fn query_one<T, F>(&self, sql: &str, params: SqlParams, map: F) -> Result<Option<T>>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T> + Send,
        T: Send,
    {
        self.read(move |conn| Ok(conn.query_row(sql, params_from_iter(params), map).optional()?))
            .await
    }

    /// Delete every row of every user-data table in one transaction.
    pub async fn wipe_all_user_data(&self) -> Result<()> {
        self.transaction(|conn| {
            for table in WIPE_ORDER {
                let removed = conn.execute(&format!("DELETE FROM {table}"), [])?;
                debug!(table, removed, "wiped table");
            }
            Ok(())
        })
        .await?;
        info!("local user data wiped");
        Ok(())
    }

    /// Delete the rows owned by one user, in the same order as a full wipe.
    pub async fn wipe_user_data(&self, uid: &str) -> Result<()> {
        self.transaction(|conn| {
            for table in WIPE_ORDER {
                let owner = if *table == "users" { "uid" } else { "userId" };
                conn.execute(&format!("DELETE FROM {table} WHERE {owner} = ?1"), params![uid])?;
            }
            Ok(())
        })
        .await?;
        info!(uid, "local data for user wiped");
        Ok(())
    }

    /// Highest applied migration version.
    pub async fn schema_version(&self) -> Result<i64> {
        self.read(|conn| Ok(applied_version(conn)?)).await
    }
}

fn applied_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names.iter().any(|name| name == column))
}

fn open_connection(
    location: &StoreLocation,
) -> std::result::Result<Connection, Box<dyn StdError + Send + Sync>> {
    let mut conn = match location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        }
        StoreLocation::Memory => Connection::open_in_memory()?,
    };
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    let version = migrate(&mut conn)?;
    info!(%location, version, "local store ready");
    Ok(conn)
}

/// Apply every pending migration, one transaction per step. Returns the final version.
pub(crate) fn migrate(conn: &mut Connection) -> rusqlite::Result<i64> {
    conn.execute_batch(SCHEMA_VERSION_TABLE)?;
    let start = applied_version(conn)?;
    let mut current = start;

    for migration in MIGRATIONS.iter().filter(|m| m.version > start) {
        let tx = conn.transaction()?;
        for add in migration.add_columns {
            if !has_column(&tx, add.table, add.column)? {
                tx.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {};",
                    add.table, add.column, add.definition
                ))?;
            }
        }
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, Utc::now().timestamp_millis()],
        )?;
        tx.commit()?;
        info!(version = migration.version, name = migration.name, "applied migration");
        current = migration.version;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::CURRENT_VERSION;
    use pretty_assertions::assert_eq;

    async fn store() -> LocalStore {
        let store = LocalStore::in_memory();
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = store().await;
        store.initialize().await.unwrap();
        assert_eq!(store.schema_version().await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_calls_before_initialize_fail() {
        let store = LocalStore::in_memory();
        let err = store.execute("DELETE FROM users", vec![]).await.unwrap_err();
        assert!(matches!(err, DbError::NotInitialized));
    }

    #[tokio::test]
    async fn test_query_one_returns_none_for_no_rows() {
        let store = store().await;
        let row = store
            .query_one(
                "SELECT uid FROM users WHERE uid = ?1",
                sql_params!["nobody".to_string()],
                |row| row.get::<_, String>(0),
            )
            .await
            .unwrap();
        assert_eq!(row, None);
    }

    #[tokio::test]
    async fn test_query_all_has_no_implicit_limit() {
        let store = store().await;
        for i in 0..120 {
            store
                .execute(
                    "INSERT INTO users (uid, createdAt, lastLogin) VALUES (?1, 0, 0)",
                    sql_params![format!("u{i}")],
                )
                .await
                .unwrap();
        }
        let uids = store
            .query_all("SELECT uid FROM users", vec![], |row| row.get::<_, String>(0))
            .await
            .unwrap();
        assert_eq!(uids.len(), 120);
    }

    #[tokio::test]
    async fn test_failed_transaction_rolls_back() {
        let store = store().await;
        let result: Result<()> = store
            .transaction(|conn| {
                conn.execute(
                    "INSERT INTO users (uid, createdAt, lastLogin) VALUES ('u1', 0, 0)",
                    [],
                )?;
                Err(DbError::InvalidData("abort".into()))
            })
            .await;
        assert!(result.is_err());

        let count = store
            .query_one("SELECT COUNT(*) FROM users", vec![], |row| row.get::<_, i64>(0))
            .await
            .unwrap();
        assert_eq!(count, Some(0));
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let store = store().await;
        let err = store
            .execute(
                "INSERT INTO settings (userId, currency) VALUES ('ghost', 'USD')",
                vec![],
            )
            .await
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[tokio::test]
    async fn test_shutdown_then_calls_fail() {
        let store = store().await;
        store.shutdown().await;
        assert!(!store.is_initialized().await);
        assert!(matches!(
            store.schema_version().await,
            Err(DbError::NotInitialized)
        ));
    }

    #[test]
    fn test_migrate_adopts_legacy_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (uid TEXT PRIMARY KEY, email TEXT, displayName TEXT, photoURL TEXT,
                createdAt INTEGER, lastLogin INTEGER, onboardingCompleted INTEGER DEFAULT 0);
             CREATE TABLE settings (userId TEXT PRIMARY KEY, currency TEXT DEFAULT 'USD',
                biometricEnabled INTEGER DEFAULT 0, notificationsEnabled INTEGER DEFAULT 1,
                maturityNotifications INTEGER DEFAULT 1, alertNotifications INTEGER DEFAULT 1,
                additionalCurrencies TEXT DEFAULT '[]', updatedAt INTEGER);
             INSERT INTO users (uid, createdAt, lastLogin) VALUES ('u1', 0, 0);
             INSERT INTO settings (userId, currency) VALUES ('u1', 'INR');",
        )
        .unwrap();

        assert_eq!(migrate(&mut conn).unwrap(), CURRENT_VERSION);
        assert!(has_column(&conn, "settings", "currencyConfigured").unwrap());
        assert!(has_column(&conn, "sync_queue", "attempts").unwrap());

        let configured: i64 = conn
            .query_row(
                "SELECT currencyConfigured FROM settings WHERE userId = 'u1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(configured, 1);

        // Second run is a no-op.
        assert_eq!(migrate(&mut conn).unwrap(), CURRENT_VERSION);
    }
}
