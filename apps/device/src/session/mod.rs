//! Session and identity handling.
//!
//! The identity provider, remote profile store, third-party SDK sessions,
//! key-value cache and biometric hardware are external collaborators; they
//! are reached only through the traits below so the gate can be driven by
//! test doubles.

mod cache;
mod gate;
mod profile;

use async_trait::async_trait;
use mintyflow_core::RemoteProfile;
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;
use crate::settings::SettingsError;

pub use cache::JsonFileCache;
pub use gate::IdentityGate;
pub use profile::HttpProfileStore;

/// Cache key holding the signed-in user id.
pub const USER_TOKEN_KEY: &str = "@mintyflow_user_token";
/// Cache key holding the onboarding flag.
pub const ONBOARDING_COMPLETED_KEY: &str = "@mintyflow_onboarding_completed";
/// Cache key mirroring the biometric lock flag.
pub const BIOMETRIC_ENABLED_KEY: &str = "@mintyflow_biometric";

/// Message shown when the provider refuses to delete a stale session.
pub const REQUIRES_RECENT_LOGIN_MESSAGE: &str =
    "For security reasons, please sign out and sign in again before deleting your account.";

/// Errors surfaced by the identity gate.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sign-in cancelled")]
    Cancelled,

    #[error("{}", REQUIRES_RECENT_LOGIN_MESSAGE)]
    RequiresRecentLogin,

    #[error("network error: {0}")]
    Network(String),

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("no user is currently signed in")]
    NotSignedIn,

    #[error("no profile record found for user {0}")]
    ProfileNotFound(String),

    #[error("local data error: {0}")]
    Local(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl From<DbError> for AuthError {
    fn from(e: DbError) -> Self {
        AuthError::Local(e.to_string())
    }
}

impl From<CacheError> for AuthError {
    fn from(e: CacheError) -> Self {
        AuthError::Local(e.to_string())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

/// Errors from the key-value cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Identity as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Externally visible session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SessionState {
    SignedOut,
    Resolving { uid: String },
    SignedIn { profile: RemoteProfile },
    Failed { uid: String, reason: String },
}

impl SessionState {
    pub fn uid(&self) -> Option<&str> {
        match self {
            Self::SignedOut => None,
            Self::Resolving { uid } | Self::Failed { uid, .. } => Some(uid),
            Self::SignedIn { profile } => Some(&profile.uid),
        }
    }
}

/// Identity provider (sign-in itself happens outside this crate).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_identity(&self) -> Option<Identity>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    /// May fail with [`AuthError::RequiresRecentLogin`].
    async fn delete_account(&self) -> Result<(), AuthError>;
}

/// Remote profile records keyed by user id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch(&self, uid: &str) -> Result<Option<RemoteProfile>, AuthError>;
    async fn create(&self, profile: &RemoteProfile) -> Result<(), AuthError>;
    /// Merge `fields` (camelCase keys) into the stored record.
    async fn update(&self, uid: &str, fields: serde_json::Value) -> Result<(), AuthError>;
    async fn remove(&self, uid: &str) -> Result<(), AuthError>;
}

/// Third-party SDK session layered on top of the provider (e.g. Google sign-in).
#[async_trait]
pub trait ThirdPartySession: Send + Sync {
    fn name(&self) -> &str;
    async fn is_signed_in(&self) -> bool;
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Small persistent string cache.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Device biometric capability.
#[async_trait]
pub trait BiometricProbe: Send + Sync {
    /// Hardware present and at least one biometric enrolled.
    async fn is_available(&self) -> bool;
}

/// Probe for devices without biometric hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBiometrics;

#[async_trait]
impl BiometricProbe for NoBiometrics {
    async fn is_available(&self) -> bool {
        false
    }
}
