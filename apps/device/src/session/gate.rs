use std::sync::Arc;

use mintyflow_core::{FixedBackoff, RemoteProfile, RetryPolicy, User};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{
    AuthError, Identity, IdentityProvider, KeyValueCache, ProfileStore, SessionState,
    ThirdPartySession, ONBOARDING_COMPLETED_KEY, USER_TOKEN_KEY,
};
use crate::db::{now_millis, SqliteRepository, UserRepository};
use crate::settings::SettingsService;

type Result<T> = std::result::Result<T, AuthError>;

/// Reconciles provider sign-in events with the remote profile record and
/// keeps the local mirror, settings and cache in step with the session.
pub struct IdentityGate {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    cache: Arc<dyn KeyValueCache>,
    settings: Arc<SettingsService>,
    repo: SqliteRepository,
    third_party: Vec<Arc<dyn ThirdPartySession>>,
    retry: Arc<dyn RetryPolicy>,
    state: watch::Sender<SessionState>,
}

impl IdentityGate {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        cache: Arc<dyn KeyValueCache>,
        settings: Arc<SettingsService>,
        repo: SqliteRepository,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::SignedOut);
        Self {
            provider,
            profiles,
            cache,
            settings,
            repo,
            third_party: Vec::new(),
            retry: Arc::new(FixedBackoff::default()),
            state,
        }
    }

    /// Register a third-party SDK session to sign out alongside the provider.
    pub fn with_third_party(mut self, session: Arc<dyn ThirdPartySession>) -> Self {
        self.third_party.push(session);
        self
    }

    /// Replace the default 5 x 300 ms profile lookup retry.
    pub fn with_retry_policy(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    fn publish(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Handle an identity change reported by the provider.
    ///
    /// Returns the reconciled profile on sign-in and `None` on sign-out.
    pub async fn on_auth_state_change(
        &self,
        identity: Option<Identity>,
    ) -> Result<Option<RemoteProfile>> {
        match identity {
            Some(identity) => self.reconcile(&identity.uid).await.map(Some),
            None => {
                self.handle_signed_out().await;
                Ok(None)
            }
        }
    }

    async fn reconcile(&self, uid: &str) -> Result<RemoteProfile> {
        self.publish(SessionState::Resolving { uid: uid.to_string() });

        let outcome = match self.fetch_with_retry(uid).await {
            Ok(Some(profile)) => self.adopt(profile).await,
            Ok(None) => Err(AuthError::ProfileNotFound(uid.to_string())),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(profile) => {
                info!(uid, "signed in");
                self.publish(SessionState::SignedIn { profile: profile.clone() });
                Ok(profile)
            }
            Err(e) => {
                warn!(uid, error = %e, "sign-in reconciliation failed");
                self.publish(SessionState::Failed {
                    uid: uid.to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Remote profile creation can trail the provider account, so a missing
    /// record is looked up again before giving up.
    async fn fetch_with_retry(&self, uid: &str) -> Result<Option<RemoteProfile>> {
        let mut profile = self.profiles.fetch(uid).await?;
        let max_retries = self.retry.max_retries();
        let mut retry = 0;
        while profile.is_none() && retry < max_retries {
            retry += 1;
            debug!(uid, retry, max_retries, "profile not found yet, retrying");
            tokio::time::sleep(self.retry.delay_for(retry)).await;
            profile = self.profiles.fetch(uid).await?;
        }
        Ok(profile)
    }

    /// Mirror profile fields locally and load the user's settings.
    async fn adopt(&self, profile: RemoteProfile) -> Result<RemoteProfile> {
        self.repo.upsert_user(&User::from(&profile)).await?;
        self.settings.load(&profile.uid).await?;
        if let Err(e) = self.cache.set(USER_TOKEN_KEY, &profile.uid).await {
            warn!(error = %e, "failed to cache user token");
        }
        Ok(profile)
    }

    async fn handle_signed_out(&self) {
        let previous = self.state.borrow().uid().map(str::to_string);
        if let Some(uid) = previous {
            self.settings.reset(&uid).await;
            info!(uid, "signed out");
        }
        self.publish(SessionState::SignedOut);
    }

    async fn current_uid(&self) -> Result<String> {
        self.provider
            .current_identity()
            .await
            .map(|identity| identity.uid)
            .ok_or(AuthError::NotSignedIn)
    }

    /// Create the remote profile for a first sign-in, or refresh it for a returning user.
    pub async fn complete_sign_in(&self, identity: &Identity) -> Result<RemoteProfile> {
        let now = now_millis();
        let profile = match self.profiles.fetch(&identity.uid).await? {
            None => {
                let profile = RemoteProfile {
                    uid: identity.uid.clone(),
                    email: identity.email.clone(),
                    display_name: identity.display_name.clone(),
                    photo_url: identity.photo_url.clone(),
                    created_at: now,
                    last_login: now,
                    onboarding_completed: false,
                    currency_setup_completed: false,
                    base_currency: None,
                };
                self.profiles.create(&profile).await?;
                info!(uid = %identity.uid, "created profile record");
                profile
            }
            Some(mut existing) => {
                self.profiles
                    .update(
                        &identity.uid,
                        json!({
                            "email": identity.email,
                            "displayName": identity.display_name,
                            "photoURL": identity.photo_url,
                            "lastLogin": now,
                        }),
                    )
                    .await?;
                existing.email = identity.email.clone();
                existing.display_name = identity.display_name.clone();
                existing.photo_url = identity.photo_url.clone();
                existing.last_login = now;
                existing
            }
        };

        self.repo.upsert_user(&User::from(&profile)).await?;
        if let Err(e) = self.cache.set(USER_TOKEN_KEY, &profile.uid).await {
            warn!(error = %e, "failed to cache user token");
        }
        Ok(profile)
    }

    pub async fn complete_onboarding(&self) -> Result<()> {
        let uid = self.current_uid().await?;
        self.cache.set(ONBOARDING_COMPLETED_KEY, "true").await?;
        self.profiles
            .update(&uid, json!({ "onboardingCompleted": true }))
            .await?;
        self.update_mirror(&uid, |user| user.onboarding_completed = true)
            .await
    }

    /// Record the one-time base currency choice locally and remotely.
    pub async fn complete_currency_setup(&self, code: &str) -> Result<()> {
        let uid = self.current_uid().await?;
        self.settings.set_base_currency(&uid, code).await?;
        self.profiles
            .update(
                &uid,
                json!({ "currencySetupCompleted": true, "baseCurrency": code }),
            )
            .await?;
        self.update_mirror(&uid, |user| {
            user.currency_setup_completed = true;
            user.base_currency = Some(code.to_string());
        })
        .await
    }

    async fn update_mirror<F>(&self, uid: &str, change: F) -> Result<()>
    where
        F: Fn(&mut User) + Send + Sync,
    {
        if let Some(mut user) = self.repo.get_user(uid).await? {
            change(&mut user);
            self.repo.upsert_user(&user).await?;
        }
        self.state.send_if_modified(|state| match state {
            SessionState::SignedIn { profile } if profile.uid == uid => {
                let mut user = User::from(&*profile);
                change(&mut user);
                profile.onboarding_completed = user.onboarding_completed;
                profile.currency_setup_completed = user.currency_setup_completed;
                profile.base_currency = user.base_currency;
                true
            }
            _ => false,
        });
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<()> {
        swallow_cancel(self.provider.sign_out().await)?;
        self.sign_out_third_party().await;
        for key in [USER_TOKEN_KEY, ONBOARDING_COMPLETED_KEY] {
            if let Err(e) = self.cache.remove(key).await {
                warn!(key, error = %e, "failed to clear cached session key");
            }
        }
        self.handle_signed_out().await;
        Ok(())
    }

    async fn sign_out_third_party(&self) {
        for session in &self.third_party {
            if !session.is_signed_in().await {
                continue;
            }
            if let Err(e) = swallow_cancel(session.sign_out().await) {
                warn!(session = session.name(), error = %e, "third-party sign-out failed");
            }
        }
    }

    /// Delete the account and everything stored for it.
    ///
    /// Local data goes first so nothing financial survives on the device even
    /// if a later remote step fails.
    pub async fn delete_account(&self) -> Result<()> {
        let uid = self.current_uid().await?;
        info!(uid, "starting account deletion");

        self.repo.store().wipe_all_user_data().await?;
        // Memory must not outlive the rows it mirrors, even if a later step fails.
        self.settings.reset(&uid).await;
        self.cache.clear().await?;
        self.profiles.remove(&uid).await?;
        match self.provider.delete_account().await {
            Ok(()) => {}
            Err(AuthError::Cancelled) => {
                debug!(uid, "account deletion cancelled at the provider");
                return Ok(());
            }
            Err(e) => {
                warn!(uid, error = %e, "provider account deletion failed");
                return Err(e);
            }
        }
        self.sign_out_third_party().await;

        self.handle_signed_out().await;
        info!(uid, "account deleted");
        Ok(())
    }
}

/// Cancellation is a user choice, not a failure.
fn swallow_cancel(result: Result<()>) -> Result<()> {
    match result {
        Err(AuthError::Cancelled) => {
            debug!("provider operation cancelled");
            Ok(())
        }
        other => other,
    }
}
