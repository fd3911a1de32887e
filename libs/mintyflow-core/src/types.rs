//! Core types for the finance data model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

/// Number of transactions fetched per history page.
pub const TRANSACTION_PAGE_SIZE: u32 = 50;

/// Days before a bill's due date when reminders start.
pub const REMINDER_DAYS_BEFORE_BILL: u32 = 3;

/// Days before a premium is due when reminders start.
pub const REMINDER_DAYS_BEFORE_PREMIUM: u32 = 7;

pub(crate) const DAY_MILLIS: Millis = 24 * 60 * 60 * 1000;

/// Enum persisted as a lowercase text column.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            /// Persisted text form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            /// Parse the persisted text form.
            pub fn from_str(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Parse, reporting unknown values as a validation error.
            pub fn parse(s: &str) -> Result<Self> {
                Self::from_str(s).ok_or_else(|| ValidationError::UnknownVariant {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

text_enum!(
    /// Wallet visibility.
    WalletKind, "wallet kind" {
        Personal => "personal",
        Shared => "shared",
        Secret => "secret",
    }
);

text_enum!(
    /// Direction of a transaction.
    TransactionKind, "transaction kind" {
        Income => "income",
        Expense => "expense",
        Transfer => "transfer",
    }
);

text_enum!(
    /// Repeat cadence of a recurring transaction.
    RecurrenceInterval, "recurrence interval" {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
        Yearly => "yearly",
    }
);

text_enum!(
    /// Budget period label.
    BudgetPeriod, "budget period" {
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
        Yearly => "yearly",
    }
);

text_enum!(
    /// Repeat cadence of a bill.
    BillInterval, "bill interval" {
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
);

text_enum!(
    /// Investment product type.
    InvestmentType, "investment type" {
        Fd => "fd",
        Rd => "rd",
        Sip => "sip",
        MutualFund => "mutual_fund",
        Etf => "etf",
        Commodity => "commodity",
        Other => "other",
    }
);

text_enum!(
    /// Installment cadence for recurring investments.
    InstallmentFrequency, "installment frequency" {
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
);

text_enum!(
    /// Premium cadence of an insurance policy.
    PremiumFrequency, "premium frequency" {
        Monthly => "monthly",
        Quarterly => "quarterly",
        HalfYearly => "half-yearly",
        Yearly => "yearly",
    }
);

text_enum!(
    /// Kind of change recorded in the sync queue.
    SyncAction, "sync action" {
        Insert => "insert",
        Update => "update",
        Delete => "delete",
    }
);

fn require_non_empty(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(())
}

fn require_non_negative(value: Decimal, field: &'static str) -> Result<()> {
    if value < Decimal::ZERO {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

fn require_positive(value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(())
}

/// Locally known user, mirrored from the remote profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: Millis,
    pub last_login: Millis,
    pub onboarding_completed: bool,
    pub currency_setup_completed: bool,
    pub base_currency: Option<String>,
}

/// Remote profile record as stored by the profile service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProfile {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub created_at: Millis,
    pub last_login: Millis,
    #[serde(default)]
    pub onboarding_completed: bool,
    #[serde(default)]
    pub currency_setup_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_currency: Option<String>,
}

impl From<&RemoteProfile> for User {
    fn from(p: &RemoteProfile) -> Self {
        Self {
            uid: p.uid.clone(),
            email: p.email.clone(),
            display_name: p.display_name.clone(),
            photo_url: p.photo_url.clone(),
            created_at: p.created_at,
            last_login: p.last_login,
            onboarding_completed: p.onboarding_completed,
            currency_setup_completed: p.currency_setup_completed,
            base_currency: p.base_currency.clone(),
        }
    }
}

/// Wallet holding a running balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub kind: WalletKind,
    pub balance: Decimal,
    pub currency: String,
    pub created_at: Millis,
    pub updated_at: Millis,
    #[serde(default)]
    pub shared_with: Vec<String>,
    pub is_encrypted: bool,
}

impl Wallet {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.name, "wallet name")?;
        require_non_empty(&self.currency, "wallet currency")
    }
}

/// A single income, expense or transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub wallet_id: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub category_id: Option<String>,
    pub description: String,
    pub notes: Option<String>,
    pub date: Millis,
    pub created_at: Millis,
    pub updated_at: Millis,
    pub recurring_interval: Option<RecurrenceInterval>,
    pub to_wallet_id: Option<String>,
}

impl Transaction {
    pub fn validate(&self) -> Result<()> {
        require_positive(self.amount)?;
        match (self.kind, self.to_wallet_id.as_deref()) {
            (TransactionKind::Transfer, None) => Err(ValidationError::MissingDestination),
            (TransactionKind::Transfer, Some(dest)) if dest == self.wallet_id => {
                Err(ValidationError::SelfTransfer(dest.to_string()))
            }
            (TransactionKind::Income | TransactionKind::Expense, Some(_)) => {
                Err(ValidationError::UnexpectedDestination)
            }
            _ => Ok(()),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring_interval.is_some()
    }

    /// Signed change applied to the source wallet balance.
    pub fn source_delta(&self) -> Decimal {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense | TransactionKind::Transfer => -self.amount,
        }
    }

    /// Destination wallet and the signed change applied to it.
    pub fn destination_delta(&self) -> Option<(&str, Decimal)> {
        match (self.kind, self.to_wallet_id.as_deref()) {
            (TransactionKind::Transfer, Some(dest)) => Some((dest, self.amount)),
            _ => None,
        }
    }
}

/// Budget alert thresholds as configured by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAlerts {
    pub at50_percent: bool,
    pub at80_percent: bool,
    pub at100_percent: bool,
}

impl Default for BudgetAlerts {
    fn default() -> Self {
        Self {
            at50_percent: true,
            at80_percent: true,
            at100_percent: true,
        }
    }
}

/// Utilization threshold a budget can cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AlertThreshold {
    Half,
    EightyPercent,
    Full,
}

impl AlertThreshold {
    pub fn percent(&self) -> Decimal {
        match self {
            Self::Half => Decimal::from(50),
            Self::EightyPercent => Decimal::from(80),
            Self::Full => Decimal::from(100),
        }
    }
}

/// Spending limit for one category within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    pub user_id: String,
    pub category_id: String,
    pub amount: Decimal,
    pub spent: Decimal,
    pub period: BudgetPeriod,
    pub start_date: Millis,
    pub end_date: Millis,
    pub created_at: Millis,
    pub updated_at: Millis,
    pub alerts: BudgetAlerts,
}

impl Budget {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.category_id, "budget category")?;
        require_positive(self.amount)?;
        require_non_negative(self.spent, "spent")?;
        if self.end_date < self.start_date {
            return Err(ValidationError::InvertedWindow);
        }
        Ok(())
    }

    pub fn contains(&self, date: Millis) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Spent as a percentage of the budgeted amount.
    pub fn utilization(&self) -> Decimal {
        if self.amount.is_zero() {
            return Decimal::ZERO;
        }
        self.spent / self.amount * Decimal::from(100)
    }

    /// Enabled thresholds currently reached, lowest first.
    pub fn crossed_thresholds(&self) -> Vec<AlertThreshold> {
        let used = self.utilization();
        [
            (AlertThreshold::Half, self.alerts.at50_percent),
            (AlertThreshold::EightyPercent, self.alerts.at80_percent),
            (AlertThreshold::Full, self.alerts.at100_percent),
        ]
        .into_iter()
        .filter(|(threshold, enabled)| *enabled && used >= threshold.percent())
        .map(|(threshold, _)| threshold)
        .collect()
    }
}

/// Savings goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub target_amount: Decimal,
    pub current_amount: Decimal,
    pub deadline: Option<Millis>,
    pub created_at: Millis,
    pub updated_at: Millis,
    pub is_completed: bool,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl Goal {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.name, "goal name")?;
        require_positive(self.target_amount)?;
        require_non_negative(self.current_amount, "current amount")
    }

    /// Add to the saved amount. Completion is sticky.
    pub fn contribute(&mut self, amount: Decimal) -> Result<()> {
        require_positive(amount)?;
        self.current_amount += amount;
        if self.current_amount >= self.target_amount {
            self.is_completed = true;
        }
        Ok(())
    }

    /// Progress toward the target, capped at 100.
    pub fn progress_percent(&self) -> Decimal {
        if self.target_amount.is_zero() {
            return Decimal::ZERO;
        }
        (self.current_amount / self.target_amount * Decimal::from(100)).min(Decimal::from(100))
    }
}

/// Recurring bill or EMI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub amount: Decimal,
    pub due_date: Millis,
    pub recurring_interval: BillInterval,
    pub category_id: Option<String>,
    pub wallet_id: Option<String>,
    pub is_paid: bool,
    pub reminder_days: u32,
    pub created_at: Millis,
    pub updated_at: Millis,
    pub last_paid_date: Option<Millis>,
    pub notes: Option<String>,
}

impl Bill {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.name, "bill name")?;
        require_positive(self.amount)
    }

    /// First moment a reminder should be shown.
    pub fn reminder_starts_at(&self) -> Millis {
        self.due_date - Millis::from(self.reminder_days) * DAY_MILLIS
    }

    /// Unpaid and inside the reminder window (including overdue).
    pub fn is_due_soon(&self, now: Millis) -> bool {
        !self.is_paid && now >= self.reminder_starts_at()
    }
}

/// Investment holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub investment_type: InvestmentType,
    pub provider: Option<String>,
    pub account_number: Option<String>,
    pub purchase_value: Decimal,
    pub current_value: Decimal,
    pub start_date: Millis,
    pub maturity_date: Option<Millis>,
    pub interest_rate: Option<Decimal>,
    pub installment_amount: Option<Decimal>,
    pub frequency: Option<InstallmentFrequency>,
    pub notes: Option<String>,
    pub created_at: Millis,
    pub updated_at: Millis,
}

impl Investment {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.name, "investment name")?;
        require_non_negative(self.purchase_value, "purchase value")?;
        require_non_negative(self.current_value, "current value")
    }

    pub fn gain(&self) -> Decimal {
        self.current_value - self.purchase_value
    }
}

/// Life insurance policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeInsurance {
    pub id: String,
    pub user_id: String,
    pub policy_name: String,
    pub provider: String,
    pub policy_number: String,
    pub premium: Decimal,
    pub premium_frequency: PremiumFrequency,
    pub start_date: Millis,
    pub end_date: Option<Millis>,
    pub coverage_amount: Decimal,
    pub is_active: bool,
    pub next_premium_date: Option<Millis>,
    pub last_paid_date: Option<Millis>,
    pub created_at: Millis,
    pub updated_at: Millis,
    pub notes: Option<String>,
}

impl LifeInsurance {
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.policy_name, "policy name")?;
        require_non_empty(&self.provider, "provider")?;
        require_non_empty(&self.policy_number, "policy number")?;
        require_positive(self.premium)?;
        require_non_negative(self.coverage_amount, "coverage amount")
    }
}

/// Durable outbox row describing one local change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: i64,
    pub user_id: Option<String>,
    pub table_name: String,
    pub record_id: String,
    pub action: SyncAction,
    /// JSON-encoded row.
    pub data: String,
    pub timestamp: Millis,
    pub synced: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Aggregated view shown on the home screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_balance: Decimal,
    pub monthly_income: Decimal,
    pub monthly_expenses: Decimal,
    pub investment_value: Decimal,
    pub investment_gains: Decimal,
    pub active_policies: usize,
    pub total_coverage: Decimal,
    pub upcoming_bills: Vec<Bill>,
    pub budget_alerts: Vec<Budget>,
}
