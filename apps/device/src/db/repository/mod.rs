//! Repository pattern for database access.
//!
//! One trait per concern, all implemented by [`SqliteRepository`] on top of the
//! shared [`LocalStore`]. Every mutation of a financial record appends an
//! outbox row to `sync_queue` inside the same store transaction.

mod dashboard;
mod holdings;
mod ledger;
mod outbox;
mod planning;
mod users;

use std::sync::Arc;

use async_trait::async_trait;
use mintyflow_core::{
    AlertThreshold, Bill, Budget, DashboardStats, Goal, Investment, LifeInsurance, Millis,
    PremiumFrequency, Settings, SyncAction, SyncQueueEntry, Transaction, User, Wallet,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::db::error::DbError;
use crate::db::store::LocalStore;

pub(crate) use outbox::enqueue_change;

type Result<T> = std::result::Result<T, DbError>;

/// Repository for locally mirrored user profiles.
#[async_trait]
pub trait UserRepository {
    async fn upsert_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, uid: &str) -> Result<Option<User>>;
}

/// Repository for the per-user settings row.
#[async_trait]
pub trait SettingsRepository {
    async fn get_settings(&self, user_id: &str) -> Result<Option<Settings>>;
    /// Insert the default row unless one exists, then return the stored row.
    async fn insert_default_settings(&self, user_id: &str, now: Millis) -> Result<Settings>;
    async fn save_settings(&self, settings: &Settings) -> Result<()>;
}

/// Repository for wallets.
#[async_trait]
pub trait WalletRepository {
    async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet>;
    async fn get_wallet(&self, id: &str) -> Result<Option<Wallet>>;
    async fn list_wallets(&self, user_id: &str) -> Result<Vec<Wallet>>;
    async fn delete_wallet(&self, id: &str) -> Result<()>;
}

/// Repository for transactions and their effect on wallet balances.
#[async_trait]
pub trait TransactionRepository {
    async fn add_transaction(&self, tx: &Transaction) -> Result<Transaction>;
    async fn delete_transaction(&self, id: &str) -> Result<()>;
    async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>>;
    /// Newest first, one page of [`mintyflow_core::TRANSACTION_PAGE_SIZE`] rows.
    async fn list_transactions(&self, user_id: &str, page: u32) -> Result<Vec<Transaction>>;
    async fn transactions_between(
        &self,
        user_id: &str,
        from: Millis,
        to: Millis,
    ) -> Result<Vec<Transaction>>;
}

/// Budget together with the alert thresholds it currently crosses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub budget: Budget,
    pub crossed: Vec<AlertThreshold>,
}

/// Repository for budgets.
#[async_trait]
pub trait BudgetRepository {
    async fn create_budget(&self, budget: &Budget) -> Result<Budget>;
    async fn list_budgets(&self, user_id: &str) -> Result<Vec<Budget>>;
    async fn recompute_budget_spent(&self, budget_id: &str) -> Result<BudgetStatus>;
}

/// Repository for savings goals.
#[async_trait]
pub trait GoalRepository {
    async fn create_goal(&self, goal: &Goal) -> Result<Goal>;
    async fn list_goals(&self, user_id: &str) -> Result<Vec<Goal>>;
    async fn contribute_to_goal(&self, goal_id: &str, amount: Decimal) -> Result<Goal>;
}

/// Repository for bills.
#[async_trait]
pub trait BillRepository {
    async fn create_bill(&self, bill: &Bill) -> Result<Bill>;
    async fn list_bills(&self, user_id: &str) -> Result<Vec<Bill>>;
    async fn mark_bill_paid(&self, bill_id: &str, paid_at: Millis) -> Result<Bill>;
    async fn upcoming_bills(&self, user_id: &str, now: Millis) -> Result<Vec<Bill>>;
}

/// Repository for investments.
#[async_trait]
pub trait InvestmentRepository {
    async fn create_investment(&self, investment: &Investment) -> Result<Investment>;
    async fn list_investments(&self, user_id: &str) -> Result<Vec<Investment>>;
    async fn refresh_valuation(
        &self,
        investment_id: &str,
        current_value: Decimal,
        now: Millis,
    ) -> Result<Investment>;
}

/// Repository for life insurance policies.
#[async_trait]
pub trait InsuranceRepository {
    async fn create_policy(&self, policy: &LifeInsurance, now: Millis) -> Result<LifeInsurance>;
    async fn list_policies(&self, user_id: &str) -> Result<Vec<LifeInsurance>>;
    async fn record_premium_paid(&self, policy_id: &str, paid_at: Millis) -> Result<LifeInsurance>;
    async fn change_premium_frequency(
        &self,
        policy_id: &str,
        frequency: PremiumFrequency,
        now: Millis,
    ) -> Result<LifeInsurance>;
}

/// Repository for the durable outbox.
#[async_trait]
pub trait SyncQueueRepository {
    async fn enqueue(
        &self,
        user_id: &str,
        table_name: &str,
        record_id: &str,
        action: SyncAction,
        data: serde_json::Value,
    ) -> Result<i64>;
    /// Unsynced entries, oldest first.
    async fn pending_entries(&self, limit: usize) -> Result<Vec<SyncQueueEntry>>;
    async fn mark_synced(&self, ids: &[i64]) -> Result<usize>;
    async fn record_sync_failure(&self, id: i64, error: &str) -> Result<()>;
}

/// Repository for aggregated read models.
#[async_trait]
pub trait DashboardRepository {
    async fn dashboard_stats(&self, user_id: &str, now: Millis) -> Result<DashboardStats>;
}

/// SQLite implementation of repositories.
#[derive(Clone)]
pub struct SqliteRepository {
    store: Arc<LocalStore>,
}

impl SqliteRepository {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }
}

fn not_found(kind: &str, id: &str) -> DbError {
    DbError::NotFound(format!("{kind} {id}"))
}

/// Give a record without an id a fresh v4 UUID.
fn assign_id(id: &mut String) {
    if id.trim().is_empty() {
        *id = Uuid::new_v4().to_string();
    }
}
