//! Per-user settings state machine over the `settings` table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use mintyflow_core::{Settings, SettingsMutation, SettingsRuleError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::db::{now_millis, DbError, SettingsRepository};
use crate::session::{BiometricProbe, KeyValueCache, BIOMETRIC_ENABLED_KEY};

/// Settings errors, already translated away from storage-engine shapes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("local store is not initialized")]
    StorageNotInitialized,

    #[error("failed to persist settings: {0}")]
    StorageQuery(String),

    #[error("{0}")]
    Precondition(String),

    #[error("{0} is already one of your currencies")]
    DuplicateCurrency(String),

    #[error("{0} cannot be changed once set")]
    ImmutableField(&'static str),
}

impl From<DbError> for SettingsError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotInitialized => SettingsError::StorageNotInitialized,
            other => SettingsError::StorageQuery(other.to_string()),
        }
    }
}

impl From<SettingsRuleError> for SettingsError {
    fn from(e: SettingsRuleError) -> Self {
        match e {
            SettingsRuleError::UnknownCurrency(code) => {
                SettingsError::Precondition(format!("{code} is not a supported currency"))
            }
            SettingsRuleError::DuplicateCurrency(code) => SettingsError::DuplicateCurrency(code),
            SettingsRuleError::BaseCurrencyLocked => SettingsError::ImmutableField("currency"),
        }
    }
}

type Result<T> = std::result::Result<T, SettingsError>;

/// Lifecycle of one user's settings view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadState {
    Unloaded,
    Loading,
    /// A persisted row existed.
    Loaded,
    /// No row existed; defaults were written.
    LoadedDefaulted,
}

impl LoadState {
    fn is_loaded(self) -> bool {
        matches!(self, Self::Loaded | Self::LoadedDefaulted)
    }
}

struct Slot {
    /// Held for the whole of a load or mutation.
    state: AsyncMutex<LoadState>,
    snapshot: watch::Sender<Settings>,
}

impl Slot {
    fn new(user_id: &str) -> Self {
        let (snapshot, _) = watch::channel(Settings::defaults(user_id));
        Self {
            state: AsyncMutex::new(LoadState::Unloaded),
            snapshot,
        }
    }

    fn current(&self) -> Settings {
        self.snapshot.borrow().clone()
    }
}

/// Authoritative in-memory and persisted settings per user.
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository + Send + Sync>,
    biometrics: Arc<dyn BiometricProbe>,
    cache: Option<Arc<dyn KeyValueCache>>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl SettingsService {
    pub fn new(
        repo: Arc<dyn SettingsRepository + Send + Sync>,
        biometrics: Arc<dyn BiometricProbe>,
    ) -> Self {
        Self {
            repo,
            biometrics,
            cache: None,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Mirror the biometric flag into `cache` whenever it changes.
    pub fn with_cache(mut self, cache: Arc<dyn KeyValueCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn slot(&self, user_id: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Slot::new(user_id)))
            .clone()
    }

    /// Load settings for `user_id`, creating the default row on first use.
    ///
    /// A second caller arriving while a load is running waits for it and
    /// gets the same result without touching the store again.
    pub async fn load(&self, user_id: &str) -> Result<Settings> {
        let slot = self.slot(user_id);
        let mut state = slot.state.lock().await;
        self.ensure_loaded(&slot, &mut state, user_id).await
    }

    async fn ensure_loaded(&self, slot: &Slot, state: &mut LoadState, user_id: &str) -> Result<Settings> {
        if state.is_loaded() {
            return Ok(slot.current());
        }

        *state = LoadState::Loading;
        let loaded = match self.repo.get_settings(user_id).await {
            Ok(Some(settings)) => Ok((settings, LoadState::Loaded)),
            Ok(None) => self
                .repo
                .insert_default_settings(user_id, now_millis())
                .await
                .map(|settings| (settings, LoadState::LoadedDefaulted)),
            Err(e) => Err(e),
        };

        match loaded {
            Ok((settings, next)) => {
                *state = next;
                slot.snapshot.send_replace(settings.clone());
                debug!(user_id, state = ?next, "settings loaded");
                Ok(settings)
            }
            Err(e) => {
                *state = LoadState::Unloaded;
                warn!(user_id, error = %e, "failed to load settings");
                Err(e.into())
            }
        }
    }

    /// Current lifecycle state for `user_id`.
    pub async fn load_state(&self, user_id: &str) -> LoadState {
        *self.slot(user_id).state.lock().await
    }

    /// Current in-memory view; defaults until loaded.
    pub fn snapshot(&self, user_id: &str) -> Settings {
        self.slot(user_id).current()
    }

    /// Receiver that observes every published snapshot for `user_id`.
    pub fn subscribe(&self, user_id: &str) -> watch::Receiver<Settings> {
        self.slot(user_id).snapshot.subscribe()
    }

    /// Whether the user explicitly picked a base currency.
    pub fn has_currency_set(&self, user_id: &str) -> bool {
        self.snapshot(user_id).currency_configured
    }

    /// Apply one typed mutation. The row is written before memory changes.
    pub async fn apply(&self, user_id: &str, mutation: SettingsMutation) -> Result<Settings> {
        let slot = self.slot(user_id);
        let mut state = slot.state.lock().await;
        let current = self.ensure_loaded(&slot, &mut state, user_id).await?;

        if mutation == SettingsMutation::ToggleBiometric
            && !current.biometric_enabled
            && !self.biometrics.is_available().await
        {
            return Err(SettingsError::Precondition(
                "Biometric authentication is not available on this device".to_string(),
            ));
        }

        let next = current.apply(&mutation, now_millis())?;
        let unchanged = Settings {
            updated_at: current.updated_at,
            ..next.clone()
        } == current;
        if unchanged {
            debug!(user_id, mutation = mutation.name(), "settings unchanged");
            return Ok(current);
        }

        self.repo.save_settings(&next).await?;
        slot.snapshot.send_replace(next.clone());
        info!(user_id, mutation = mutation.name(), "settings updated");

        if mutation == SettingsMutation::ToggleBiometric {
            self.mirror_biometric(next.biometric_enabled).await;
        }
        Ok(next)
    }

    async fn mirror_biometric(&self, enabled: bool) {
        let Some(cache) = &self.cache else {
            return;
        };
        let value = if enabled { "1" } else { "0" };
        if let Err(e) = cache.set(BIOMETRIC_ENABLED_KEY, value).await {
            warn!(error = %e, "failed to mirror biometric flag");
        }
    }

    pub async fn set_base_currency(&self, user_id: &str, code: &str) -> Result<Settings> {
        self.apply(user_id, SettingsMutation::SetBaseCurrency(code.to_string()))
            .await
    }

    pub async fn toggle_biometric(&self, user_id: &str) -> Result<Settings> {
        self.apply(user_id, SettingsMutation::ToggleBiometric).await
    }

    pub async fn toggle_notifications(&self, user_id: &str) -> Result<Settings> {
        self.apply(user_id, SettingsMutation::ToggleNotifications).await
    }

    pub async fn toggle_maturity_notifications(&self, user_id: &str) -> Result<Settings> {
        self.apply(user_id, SettingsMutation::ToggleMaturityNotifications)
            .await
    }

    pub async fn toggle_alert_notifications(&self, user_id: &str) -> Result<Settings> {
        self.apply(user_id, SettingsMutation::ToggleAlertNotifications)
            .await
    }

    pub async fn add_additional_currency(&self, user_id: &str, code: &str) -> Result<Settings> {
        self.apply(user_id, SettingsMutation::AddAdditionalCurrency(code.to_string()))
            .await
    }

    pub async fn remove_additional_currency(&self, user_id: &str, code: &str) -> Result<Settings> {
        self.apply(user_id, SettingsMutation::RemoveAdditionalCurrency(code.to_string()))
            .await
    }

    /// Forget the in-memory view. Persisted rows are left alone.
    ///
    /// The user's slot is dropped afterwards; existing subscribers keep the
    /// defaults as their last value and the next call starts a fresh slot.
    pub async fn reset(&self, user_id: &str) {
        let slot = self.slot(user_id);
        let mut state = slot.state.lock().await;
        *state = LoadState::Unloaded;
        slot.snapshot.send_replace(Settings::defaults(user_id));

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(user_id).is_some_and(|held| Arc::ptr_eq(held, &slot)) {
            slots.remove(user_id);
        }
        debug!(user_id, "settings reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LocalStore, SqliteRepository};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeBiometrics(AtomicBool);

    #[async_trait]
    impl BiometricProbe for FakeBiometrics {
        async fn is_available(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    async fn service(biometrics_available: bool) -> SettingsService {
        let store = Arc::new(LocalStore::in_memory());
        store.initialize().await.unwrap();
        SettingsService::new(
            Arc::new(SqliteRepository::new(store)),
            Arc::new(FakeBiometrics(AtomicBool::new(biometrics_available))),
        )
    }

    #[tokio::test]
    async fn test_load_defaults_then_loaded() {
        let service = service(true).await;
        assert_eq!(service.load_state("u1").await, LoadState::Unloaded);

        let settings = service.load("u1").await.unwrap();
        assert_eq!(settings.currency, "USD");
        assert!(!service.has_currency_set("u1"));
        assert_eq!(service.load_state("u1").await, LoadState::LoadedDefaulted);

        service.reset("u1").await;
        service.load("u1").await.unwrap();
        assert_eq!(service.load_state("u1").await, LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_biometric_precondition_only_when_enabling() {
        let service = service(false).await;
        let err = service.toggle_biometric("u1").await.unwrap_err();
        assert!(matches!(err, SettingsError::Precondition(_)));
        assert!(!service.snapshot("u1").biometric_enabled);
    }

    #[tokio::test]
    async fn test_base_currency_is_immutable() {
        let service = service(true).await;
        service.set_base_currency("u1", "INR").await.unwrap();
        assert!(service.has_currency_set("u1"));

        assert_eq!(
            service.set_base_currency("u1", "EUR").await.unwrap_err(),
            SettingsError::ImmutableField("currency")
        );
        assert_eq!(
            service.set_base_currency("u1", "XXX").await.unwrap_err(),
            SettingsError::Precondition("XXX is not a supported currency".into())
        );
        assert_eq!(service.snapshot("u1").currency, "INR");
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let service = service(true).await;
        let mut rx = service.subscribe("u1");
        service.load("u1").await.unwrap();
        service.add_additional_currency("u1", "EUR").await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().additional_currencies, vec!["EUR"]);

        service.reset("u1").await;
        assert!(rx.borrow_and_update().additional_currencies.is_empty());
    }

    #[tokio::test]
    async fn test_reset_releases_user_slot() {
        let service = service(true).await;
        service.load("u1").await.unwrap();
        service.load("u2").await.unwrap();
        assert_eq!(service.slots.lock().unwrap().len(), 2);

        service.reset("u1").await;
        assert_eq!(service.slots.lock().unwrap().len(), 1);
        assert!(!service.slots.lock().unwrap().contains_key("u1"));

        // The persisted row is still there for the next load.
        service.load("u1").await.unwrap();
        assert_eq!(service.load_state("u1").await, LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_storage_errors_are_translated() {
        let store = Arc::new(LocalStore::in_memory());
        let service = SettingsService::new(
            Arc::new(SqliteRepository::new(store)),
            Arc::new(FakeBiometrics(AtomicBool::new(true))),
        );
        assert_eq!(
            service.load("u1").await.unwrap_err(),
            SettingsError::StorageNotInitialized
        );
        assert_eq!(service.load_state("u1").await, LoadState::Unloaded);
    }
}
