//! Shared fixtures and collaborator fakes for the device integration tests.
//!
//! Every test gets its own database file inside a temporary directory, so
//! tests never share state and can run in parallel.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mintyflow_core::{
    Bill, BillInterval, Budget, BudgetAlerts, BudgetPeriod, Goal, Investment, InvestmentType,
    LifeInsurance, Millis, PremiumFrequency, RemoteProfile, Transaction, TransactionKind, User,
    Wallet, WalletKind,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use mintyflow_lib::db::LocalStore;
use mintyflow_lib::session::{
    AuthError, BiometricProbe, CacheError, Identity, IdentityProvider, KeyValueCache,
    ProfileStore, ThirdPartySession,
};
use mintyflow_lib::state::AppState;

/// Ordered record of collaborator calls shared between fakes.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// 2024-03-15T12:00:00Z
pub const NOW: Millis = 1_710_504_000_000;
pub const DAY: Millis = 24 * 60 * 60 * 1000;

/// Temporary data directory with an initialized store and wired state.
pub struct TestContext {
    pub dir: TempDir,
    pub state: AppState,
    pub cache: Arc<MemoryCache>,
    pub biometrics: Arc<FakeBiometrics>,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = Arc::new(LocalStore::new(dir.path()));
        store.initialize().await.expect("failed to initialize store");

        let cache = Arc::new(MemoryCache::default());
        let biometrics = Arc::new(FakeBiometrics::new(true));
        let state = AppState::new(store, cache.clone(), biometrics.clone());
        Self {
            dir,
            state,
            cache,
            biometrics,
        }
    }

    /// Same database file, fresh in-memory services (simulates an app restart).
    pub async fn restart(&self) -> AppState {
        let store = Arc::new(LocalStore::new(self.dir.path()));
        store.initialize().await.expect("failed to reopen store");
        AppState::new(store, self.cache.clone(), self.biometrics.clone())
    }

    pub async fn count(&self, table: &str, user_id: &str) -> i64 {
        let owner = if table == "users" { "uid" } else { "userId" };
        self.state
            .store
            .query_one(
                &format!("SELECT COUNT(*) FROM {table} WHERE {owner} = ?1"),
                vec![user_id.to_string().into()],
                |row| row.get(0),
            )
            .await
            .expect("count query failed")
            .unwrap_or(0)
    }
}

// === Fixtures ===

pub fn user(uid: &str) -> User {
    User {
        uid: uid.to_string(),
        email: Some(format!("{uid}@example.com")),
        display_name: Some(format!("User {uid}")),
        photo_url: None,
        created_at: NOW,
        last_login: NOW,
        onboarding_completed: false,
        currency_setup_completed: false,
        base_currency: None,
    }
}

pub fn profile(uid: &str) -> RemoteProfile {
    RemoteProfile {
        uid: uid.to_string(),
        email: Some(format!("{uid}@example.com")),
        display_name: Some(format!("User {uid}")),
        photo_url: None,
        created_at: NOW,
        last_login: NOW,
        onboarding_completed: true,
        currency_setup_completed: false,
        base_currency: None,
    }
}

pub fn identity(uid: &str) -> Identity {
    Identity {
        uid: uid.to_string(),
        email: Some(format!("{uid}@example.com")),
        display_name: Some(format!("User {uid}")),
        photo_url: None,
    }
}

pub fn wallet(id: &str, user_id: &str, balance: Decimal) -> Wallet {
    Wallet {
        id: id.to_string(),
        user_id: user_id.to_string(),
        name: format!("Wallet {id}"),
        kind: WalletKind::Personal,
        balance,
        currency: "USD".to_string(),
        created_at: NOW,
        updated_at: NOW,
        shared_with: Vec::new(),
        is_encrypted: false,
    }
}

pub fn expense(id: &str, user_id: &str, wallet_id: &str, amount: Decimal) -> Transaction {
    Transaction {
        id: id.to_string(),
        user_id: user_id.to_string(),
        wallet_id: wallet_id.to_string(),
        kind: TransactionKind::Expense,
        amount,
        category_id: Some("groceries".to_string()),
        description: format!("expense {id}"),
        notes: None,
        date: NOW,
        created_at: NOW,
        updated_at: NOW,
        recurring_interval: None,
        to_wallet_id: None,
    }
}

pub fn budget(id: &str, user_id: &str) -> Budget {
    Budget {
        id: id.to_string(),
        user_id: user_id.to_string(),
        category_id: "groceries".to_string(),
        amount: dec!(500),
        spent: Decimal::ZERO,
        period: BudgetPeriod::Monthly,
        start_date: NOW - 14 * DAY,
        end_date: NOW + 16 * DAY,
        created_at: NOW,
        updated_at: NOW,
        alerts: BudgetAlerts::default(),
    }
}

pub fn goal(id: &str, user_id: &str) -> Goal {
    Goal {
        id: id.to_string(),
        user_id: user_id.to_string(),
        name: "Emergency fund".to_string(),
        target_amount: dec!(1000),
        current_amount: dec!(100),
        deadline: None,
        created_at: NOW,
        updated_at: NOW,
        is_completed: false,
        icon: None,
        color: None,
    }
}

pub fn bill(id: &str, user_id: &str) -> Bill {
    Bill {
        id: id.to_string(),
        user_id: user_id.to_string(),
        name: "Electricity".to_string(),
        amount: dec!(80),
        due_date: NOW + 2 * DAY,
        recurring_interval: BillInterval::Monthly,
        category_id: None,
        wallet_id: None,
        is_paid: false,
        reminder_days: 3,
        created_at: NOW,
        updated_at: NOW,
        last_paid_date: None,
        notes: None,
    }
}

pub fn investment(id: &str, user_id: &str) -> Investment {
    Investment {
        id: id.to_string(),
        user_id: user_id.to_string(),
        name: "Index fund".to_string(),
        investment_type: InvestmentType::MutualFund,
        provider: Some("Vanguard".to_string()),
        account_number: None,
        purchase_value: dec!(2000),
        current_value: dec!(2300),
        start_date: NOW - 365 * DAY,
        maturity_date: None,
        interest_rate: None,
        installment_amount: None,
        frequency: None,
        notes: None,
        created_at: NOW,
        updated_at: NOW,
    }
}

pub fn policy(id: &str, user_id: &str) -> LifeInsurance {
    LifeInsurance {
        id: id.to_string(),
        user_id: user_id.to_string(),
        policy_name: "Term life".to_string(),
        provider: "Acme Life".to_string(),
        policy_number: "TL-001".to_string(),
        premium: dec!(45),
        premium_frequency: PremiumFrequency::Monthly,
        start_date: NOW - 30 * DAY,
        end_date: None,
        coverage_amount: dec!(250000),
        is_active: true,
        next_premium_date: None,
        last_paid_date: None,
        created_at: NOW,
        updated_at: NOW,
        notes: None,
    }
}

// === Collaborator fakes ===

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, String>>,
    calls: Mutex<Option<CallLog>>,
    clear_fails: AtomicBool,
}

impl MemoryCache {
    /// Append `cache.clear` to `log` whenever the cache is cleared.
    pub fn record_calls(&self, log: CallLog) {
        *self.calls.lock().unwrap() = Some(log);
    }

    pub fn fail_clear(&self) {
        self.clear_fails.store(true, Ordering::SeqCst);
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        if self.clear_fails.load(Ordering::SeqCst) {
            return Err(CacheError::Io(std::io::Error::other("disk full")));
        }
        if let Some(log) = self.calls.lock().unwrap().as_ref() {
            log.lock().unwrap().push("cache.clear".to_string());
        }
        self.entries.lock().unwrap().clear();
        Ok(())
    }
}

pub struct FakeBiometrics(AtomicBool);

impl FakeBiometrics {
    pub fn new(available: bool) -> Self {
        Self(AtomicBool::new(available))
    }

    pub fn set_available(&self, available: bool) {
        self.0.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl BiometricProbe for FakeBiometrics {
    async fn is_available(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Profile store that reports a record only from the `appears_on`-th fetch.
pub struct FakeProfiles {
    pub records: Mutex<BTreeMap<String, RemoteProfile>>,
    pub updates: Mutex<Vec<(String, serde_json::Value)>>,
    pub fetches: AtomicUsize,
    appears_on: usize,
    log: Option<CallLog>,
}

impl FakeProfiles {
    pub fn new() -> Self {
        Self::appearing_on(1)
    }

    pub fn appearing_on(fetch: usize) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            updates: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            appears_on: fetch,
            log: None,
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_record(self, profile: RemoteProfile) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(profile.uid.clone(), profile);
        self
    }

    pub fn record(&self, uid: &str) -> Option<RemoteProfile> {
        self.records.lock().unwrap().get(uid).cloned()
    }
}

#[async_trait]
impl ProfileStore for FakeProfiles {
    async fn fetch(&self, uid: &str) -> Result<Option<RemoteProfile>, AuthError> {
        let attempt = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt < self.appears_on {
            return Ok(None);
        }
        Ok(self.record(uid))
    }

    async fn create(&self, profile: &RemoteProfile) -> Result<(), AuthError> {
        self.records
            .lock()
            .unwrap()
            .insert(profile.uid.clone(), profile.clone());
        Ok(())
    }

    async fn update(&self, uid: &str, fields: serde_json::Value) -> Result<(), AuthError> {
        self.updates
            .lock()
            .unwrap()
            .push((uid.to_string(), fields));
        Ok(())
    }

    async fn remove(&self, uid: &str) -> Result<(), AuthError> {
        if let Some(log) = &self.log {
            log.lock().unwrap().push("profiles.remove".to_string());
        }
        self.records.lock().unwrap().remove(uid);
        Ok(())
    }
}

/// Provider that records calls in `log` and can refuse deletion.
pub struct FakeProvider {
    identity: Mutex<Option<Identity>>,
    pub requires_recent_login: AtomicBool,
    pub log: CallLog,
}

impl FakeProvider {
    pub fn signed_in(uid: &str, log: CallLog) -> Self {
        Self {
            identity: Mutex::new(Some(identity(uid))),
            requires_recent_login: AtomicBool::new(false),
            log,
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn current_identity(&self) -> Option<Identity> {
        self.identity.lock().unwrap().clone()
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.log.lock().unwrap().push("provider.sign_out".to_string());
        *self.identity.lock().unwrap() = None;
        Ok(())
    }

    async fn delete_account(&self) -> Result<(), AuthError> {
        if self.requires_recent_login.load(Ordering::SeqCst) {
            return Err(AuthError::RequiresRecentLogin);
        }
        self.log
            .lock()
            .unwrap()
            .push("provider.delete_account".to_string());
        *self.identity.lock().unwrap() = None;
        Ok(())
    }
}

pub struct FakeThirdParty {
    signed_in: AtomicBool,
    log: CallLog,
}

impl FakeThirdParty {
    pub fn new(signed_in: bool, log: CallLog) -> Self {
        Self {
            signed_in: AtomicBool::new(signed_in),
            log,
        }
    }
}

#[async_trait]
impl ThirdPartySession for FakeThirdParty {
    fn name(&self) -> &str {
        "google"
    }

    async fn is_signed_in(&self) -> bool {
        self.signed_in.load(Ordering::SeqCst)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.log.lock().unwrap().push("google.sign_out".to_string());
        self.signed_in.store(false, Ordering::SeqCst);
        Ok(())
    }
}
