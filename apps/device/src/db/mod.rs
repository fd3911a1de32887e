//! Local SQLite database operations.

pub mod codec;
pub mod error;
pub mod repository;
pub mod schema;
pub mod store;

use chrono::Utc;
use mintyflow_core::Millis;

pub use error::DbError;
pub use repository::{
    BillRepository, BudgetRepository, BudgetStatus, DashboardRepository, GoalRepository,
    InsuranceRepository, InvestmentRepository, SettingsRepository, SqliteRepository,
    SyncQueueRepository, TransactionRepository, UserRepository, WalletRepository,
};
pub use schema::{CURRENT_VERSION, DB_FILE_NAME};
pub use store::{LocalStore, SqlParams, StoreLocation, BUSY_TIMEOUT};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> Millis {
    Utc::now().timestamp_millis()
}
