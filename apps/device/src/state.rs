//! Application state.

use std::sync::Arc;

use crate::db::{LocalStore, SqliteRepository};
use crate::session::{BiometricProbe, IdentityGate, IdentityProvider, KeyValueCache, ProfileStore};
use crate::settings::SettingsService;

/// Composition root: one store handle injected into every consumer.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LocalStore>,
    pub repository: SqliteRepository,
    pub settings: Arc<SettingsService>,
    pub cache: Arc<dyn KeyValueCache>,
    profiles: Option<Arc<dyn ProfileStore>>,
}

impl AppState {
    /// `store` should already be initialized (see [`crate::bootstrap::Bootstrap`]).
    pub fn new(
        store: Arc<LocalStore>,
        cache: Arc<dyn KeyValueCache>,
        biometrics: Arc<dyn BiometricProbe>,
    ) -> Self {
        let repository = SqliteRepository::new(Arc::clone(&store));
        let settings = SettingsService::new(Arc::new(repository.clone()), biometrics)
            .with_cache(Arc::clone(&cache));
        Self {
            store,
            repository,
            settings: Arc::new(settings),
            cache,
            profiles: None,
        }
    }

    pub fn with_profile_store(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Identity gate wired to this state, or `None` without a profile store.
    pub fn identity_gate(&self, provider: Arc<dyn IdentityProvider>) -> Option<IdentityGate> {
        let profiles = self.profiles.clone()?;
        Some(IdentityGate::new(
            provider,
            profiles,
            Arc::clone(&self.cache),
            Arc::clone(&self.settings),
            self.repository.clone(),
        ))
    }
}
