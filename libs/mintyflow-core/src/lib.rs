//! Core finance domain shared by the device data layer.
//!
//! Provides:
//! - Entity types and their invariants (wallets, transactions, budgets, ...)
//! - The static currency catalogue
//! - Typed settings mutations and their rules
//! - Calendar math for bills, premiums and recurring transactions
//! - Retry policies

pub mod currency;
pub mod error;
pub mod retry;
pub mod schedule;
pub mod settings;
pub mod types;

pub use currency::{Currency, CURRENCIES, DEFAULT_CURRENCY};
pub use error::{Result, SettingsRuleError, ValidationError};
pub use retry::{ExponentialBackoff, FixedBackoff, RetryPolicy};
pub use schedule::{month_window, next_occurrence, next_premium_date, Cadence};
pub use settings::{Settings, SettingsMutation};
pub use types::{
    AlertThreshold, Bill, BillInterval, Budget, BudgetAlerts, BudgetPeriod, DashboardStats, Goal,
    InstallmentFrequency, Investment, InvestmentType, LifeInsurance, Millis, PremiumFrequency,
    RecurrenceInterval, RemoteProfile, SyncAction, SyncQueueEntry, Transaction, TransactionKind,
    User, Wallet, WalletKind, REMINDER_DAYS_BEFORE_BILL, REMINDER_DAYS_BEFORE_PREMIUM,
    TRANSACTION_PAGE_SIZE,
};
