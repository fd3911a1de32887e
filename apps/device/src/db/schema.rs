//! SQLite schema definitions.
//!
//! The schema evolves through ordered migrations recorded in `schema_version`.
//! Version 1 is the baseline every install starts from; it only uses
//! `IF NOT EXISTS` statements so it can also adopt a database that predates
//! version tracking.

/// Fixed database file name, one per installation.
pub const DB_FILE_NAME: &str = "mintyflow.db";

/// Tables deleted by a full wipe, children before parents.
pub const WIPE_ORDER: &[&str] = &[
    "transactions",
    "wallets",
    "budgets",
    "goals",
    "bills",
    "investments",
    "life_insurance",
    "sync_queue",
    "settings",
    "users",
];

/// Version bookkeeping, created before any migration runs.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL
);
"#;

/// Column added by a migration when it is not already present.
#[derive(Debug, Clone, Copy)]
pub struct AddColumn {
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

/// One ordered schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    /// Columns added before `sql` runs.
    pub add_columns: &'static [AddColumn],
    pub sql: &'static str,
}

/// Latest schema version known to this build.
pub const CURRENT_VERSION: i64 = 3;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "baseline",
        add_columns: &[],
        sql: BASELINE,
    },
    Migration {
        version: 2,
        name: "profile_and_settings_flags",
        add_columns: &[
            AddColumn { table: "users", column: "currencySetupCompleted", definition: "INTEGER DEFAULT 0" },
            AddColumn { table: "users", column: "baseCurrency", definition: "TEXT" },
            AddColumn { table: "wallets", column: "sharedWith", definition: "TEXT DEFAULT '[]'" },
            AddColumn { table: "budgets", column: "alertAt50", definition: "INTEGER DEFAULT 1" },
            AddColumn { table: "budgets", column: "alertAt80", definition: "INTEGER DEFAULT 1" },
            AddColumn { table: "budgets", column: "alertAt100", definition: "INTEGER DEFAULT 1" },
            AddColumn { table: "life_insurance", column: "lastPaidDate", definition: "INTEGER" },
            AddColumn { table: "settings", column: "currencyConfigured", definition: "INTEGER NOT NULL DEFAULT 0" },
        ],
        // Rows written before the flag existed were only ever created once a
        // currency had been chosen.
        sql: "UPDATE settings SET currencyConfigured = 1;",
    },
    Migration {
        version: 3,
        name: "outbox_tracking",
        add_columns: &[
            AddColumn { table: "sync_queue", column: "userId", definition: "TEXT" },
            AddColumn { table: "sync_queue", column: "attempts", definition: "INTEGER NOT NULL DEFAULT 0" },
            AddColumn { table: "sync_queue", column: "lastError", definition: "TEXT" },
        ],
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_sync_queue_synced ON sync_queue(synced);
CREATE INDEX IF NOT EXISTS idx_sync_queue_userId ON sync_queue(userId);
CREATE INDEX IF NOT EXISTS idx_budgets_userId ON budgets(userId);
CREATE INDEX IF NOT EXISTS idx_goals_userId ON goals(userId);
"#,
    },
];

const BASELINE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    uid TEXT PRIMARY KEY,
    email TEXT,
    displayName TEXT,
    photoURL TEXT,
    createdAt INTEGER,
    lastLogin INTEGER,
    onboardingCompleted INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS wallets (
    id TEXT PRIMARY KEY,
    userId TEXT NOT NULL,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    balance REAL DEFAULT 0,
    currency TEXT DEFAULT 'USD',
    createdAt INTEGER,
    updatedAt INTEGER,
    isEncrypted INTEGER DEFAULT 0,
    FOREIGN KEY (userId) REFERENCES users(uid)
);

CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    userId TEXT NOT NULL,
    walletId TEXT NOT NULL,
    type TEXT NOT NULL,
    amount REAL NOT NULL,
    category TEXT,
    categoryId TEXT,
    description TEXT,
    notes TEXT,
    date INTEGER,
    createdAt INTEGER,
    updatedAt INTEGER,
    isRecurring INTEGER DEFAULT 0,
    recurringInterval TEXT,
    toWalletId TEXT,
    FOREIGN KEY (userId) REFERENCES users(uid),
    FOREIGN KEY (walletId) REFERENCES wallets(id)
);

CREATE TABLE IF NOT EXISTS budgets (
    id TEXT PRIMARY KEY,
    userId TEXT NOT NULL,
    categoryId TEXT NOT NULL,
    amount REAL NOT NULL,
    spent REAL DEFAULT 0,
    period TEXT NOT NULL,
    startDate INTEGER,
    endDate INTEGER,
    createdAt INTEGER,
    updatedAt INTEGER,
    FOREIGN KEY (userId) REFERENCES users(uid)
);

CREATE TABLE IF NOT EXISTS goals (
    id TEXT PRIMARY KEY,
    userId TEXT NOT NULL,
    name TEXT NOT NULL,
    targetAmount REAL NOT NULL,
    currentAmount REAL DEFAULT 0,
    deadline INTEGER,
    createdAt INTEGER,
    updatedAt INTEGER,
    isCompleted INTEGER DEFAULT 0,
    icon TEXT,
    color TEXT,
    FOREIGN KEY (userId) REFERENCES users(uid)
);

CREATE TABLE IF NOT EXISTS bills (
    id TEXT PRIMARY KEY,
    userId TEXT NOT NULL,
    name TEXT NOT NULL,
    amount REAL NOT NULL,
    dueDate INTEGER,
    recurringInterval TEXT,
    categoryId TEXT,
    walletId TEXT,
    isPaid INTEGER DEFAULT 0,
    reminderDays INTEGER DEFAULT 3,
    createdAt INTEGER,
    updatedAt INTEGER,
    lastPaidDate INTEGER,
    notes TEXT,
    FOREIGN KEY (userId) REFERENCES users(uid)
);

CREATE TABLE IF NOT EXISTS investments (
    id TEXT PRIMARY KEY,
    userId TEXT NOT NULL,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    provider TEXT,
    accountNumber TEXT,
    purchaseValue REAL NOT NULL,
    currentValue REAL NOT NULL,
    startDate INTEGER,
    maturityDate INTEGER,
    createdAt INTEGER,
    updatedAt INTEGER,
    notes TEXT,
    interestRate REAL,
    installmentAmount REAL,
    frequency TEXT,
    FOREIGN KEY (userId) REFERENCES users(uid)
);

CREATE TABLE IF NOT EXISTS life_insurance (
    id TEXT PRIMARY KEY,
    userId TEXT NOT NULL,
    policyName TEXT NOT NULL,
    provider TEXT NOT NULL,
    policyNumber TEXT NOT NULL,
    premium REAL NOT NULL,
    premiumFrequency TEXT NOT NULL,
    startDate INTEGER,
    endDate INTEGER,
    coverageAmount REAL NOT NULL,
    isActive INTEGER DEFAULT 1,
    nextPremiumDate INTEGER,
    createdAt INTEGER,
    updatedAt INTEGER,
    notes TEXT,
    FOREIGN KEY (userId) REFERENCES users(uid)
);

CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    record_id TEXT NOT NULL,
    action TEXT NOT NULL,
    data TEXT NOT NULL,
    timestamp INTEGER,
    synced INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS settings (
    userId TEXT PRIMARY KEY,
    currency TEXT DEFAULT 'USD',
    biometricEnabled INTEGER DEFAULT 0,
    notificationsEnabled INTEGER DEFAULT 1,
    maturityNotifications INTEGER DEFAULT 1,
    alertNotifications INTEGER DEFAULT 1,
    additionalCurrencies TEXT DEFAULT '[]',
    updatedAt INTEGER,
    FOREIGN KEY (userId) REFERENCES users(uid)
);

CREATE INDEX IF NOT EXISTS idx_transactions_userId ON transactions(userId);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
CREATE INDEX IF NOT EXISTS idx_wallets_userId ON wallets(userId);
CREATE INDEX IF NOT EXISTS idx_bills_userId ON bills(userId);
CREATE INDEX IF NOT EXISTS idx_investments_userId ON investments(userId);
CREATE INDEX IF NOT EXISTS idx_insurance_userId ON life_insurance(userId);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let versions: Vec<i64> = MIGRATIONS.iter().map(|m| m.version).collect();
        let expected: Vec<i64> = (1..=CURRENT_VERSION).collect();
        assert_eq!(versions, expected);
    }

    #[test]
    fn test_wipe_order_ends_with_users() {
        assert_eq!(WIPE_ORDER.last(), Some(&"users"));
        let settings = WIPE_ORDER.iter().position(|t| *t == "settings").unwrap();
        let wallets = WIPE_ORDER.iter().position(|t| *t == "wallets").unwrap();
        let transactions = WIPE_ORDER.iter().position(|t| *t == "transactions").unwrap();
        assert!(transactions < wallets);
        assert!(settings < WIPE_ORDER.len() - 1);
    }
}
