//! Client-credentials access token with expiry

use crate::error::{ApiError, Result};
use crate::types::TokenResponse;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Credentials for the client-credentials exchange
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Caches the access token and refreshes it once expired
///
/// Refresh runs under the lock, so concurrent callers that observe expiry
/// wait for the first one's exchange instead of each hitting the provider.
pub struct TokenCache {
    http: reqwest::Client,
    credentials: Credentials,
    state: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            http,
            credentials,
            state: Mutex::new(None),
        }
    }

    /// A valid access token, exchanging credentials when needed
    pub async fn token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
        }

        let fresh = self.exchange().await?;
        let value = fresh.value.clone();
        *state = Some(fresh);
        Ok(value)
    }

    /// Forget the cached token so the next call exchanges again
    pub async fn invalidate(&self) {
        *self.state.lock().await = None;
    }

    async fn exchange(&self) -> Result<CachedToken> {
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", self.credentials.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.credentials.token_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Auth(format!("{}: {}", status.as_u16(), body)));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Auth(format!("malformed token response: {}", e)))?;

        let prefix: String = token.access_token.chars().take(12).collect();
        info!(token = %format!("{}...", prefix), expires_in = token.expires_in, "got new access token");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}
