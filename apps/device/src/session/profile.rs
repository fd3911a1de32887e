use async_trait::async_trait;
use mintyflow_core::RemoteProfile;
use reqwest::{Client, Response, StatusCode};

use super::{AuthError, ProfileStore};

/// Profile records served over REST at `{base_url}/users/{uid}`.
#[derive(Clone)]
pub struct HttpProfileStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpProfileStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send `token` as a bearer credential on every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, uid: &str) -> String {
        format!("{}/users/{}", self.base_url, uid)
    }

    fn request(&self, method: reqwest::Method, uid: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(uid));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn ensure_success(resp: Response) -> Result<Response, AuthError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    Err(AuthError::Provider(format!("profile service returned {status}: {message}")))
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    async fn fetch(&self, uid: &str) -> Result<Option<RemoteProfile>, AuthError> {
        let resp = self.request(reqwest::Method::GET, uid).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp).await?;
        // The profile service answers `null` for a missing record as well.
        resp.json::<Option<RemoteProfile>>()
            .await
            .map_err(|e| AuthError::Provider(format!("malformed profile record: {e}")))
    }

    async fn create(&self, profile: &RemoteProfile) -> Result<(), AuthError> {
        let resp = self
            .request(reqwest::Method::PUT, &profile.uid)
            .json(profile)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn update(&self, uid: &str, fields: serde_json::Value) -> Result<(), AuthError> {
        let resp = self
            .request(reqwest::Method::PATCH, uid)
            .json(&fields)
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }

    async fn remove(&self, uid: &str) -> Result<(), AuthError> {
        let resp = self.request(reqwest::Method::DELETE, uid).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(resp).await?;
        Ok(())
    }
}
