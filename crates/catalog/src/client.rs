//! Rate-limited, authenticated access to the catalog API

use crate::error::{ApiError, Result};
use crate::permits::PermitPool;
use crate::token::{Credentials, TokenCache};
use crate::types::{Account, ActivityPage, ActivityRecord, ContentItem, SearchResponse};
use futures::StreamExt;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Connection settings for [`RateLimitedClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub credentials: Credentials,
    /// Requests allowed per cool-down window
    pub requests_per_window: u32,
    pub cooldown: Duration,
    pub timeout: Duration,
}

/// Catalog API client
///
/// Every request takes a permit from the pool and carries a bearer token
/// that is refreshed transparently.
pub struct RateLimitedClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenCache,
    permits: PermitPool,
}

impl RateLimitedClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_http(http, config))
    }

    /// Build around an existing reqwest client
    pub fn with_http(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            tokens: TokenCache::new(http.clone(), config.credentials),
            permits: PermitPool::new(config.requests_per_window, config.cooldown),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn permits(&self) -> &PermitPool {
        &self.permits
    }

    /// GET a route relative to the base url
    pub async fn fetch(&self, route: &str) -> Result<reqwest::Response> {
        let url = self.url(route)?;
        self.fetch_url(url).await
    }

    /// GET a route and decode its JSON body
    pub async fn fetch_json<T: DeserializeOwned>(&self, route: &str) -> Result<T> {
        let url = self.url(route)?;
        self.fetch_json_url(url).await
    }

    /// GET a route and stream the body into `path`; returns bytes written
    pub async fn download_to(&self, route: &str, path: &Path) -> Result<u64> {
        let response = self.fetch(route).await?;
        let io_error = |source| ApiError::Download {
            path: path.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(path).await.map_err(io_error)?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;

        debug!(route, bytes = written, path = %path.display(), "downloaded file");
        Ok(written)
    }

    /// `GET /catalog/{id}`
    pub async fn item(&self, item_id: u64) -> Result<ContentItem> {
        self.fetch_json(&format!("/catalog/{}", item_id)).await
    }

    /// `GET /catalog/search?status=pending`, malformed entries skipped
    pub async fn pending(&self) -> Result<Vec<ContentItem>> {
        let route = "/catalog/search?status=pending";
        let response: SearchResponse = self.fetch_json(route).await?;
        Ok(decode_lenient(route, response.items))
    }

    /// `GET /accounts/{id}/activity?limit&offset`, newest first
    pub async fn activity(&self, entity: u64, limit: usize, offset: usize) -> Result<ActivityPage> {
        let route = format!("/accounts/{}/activity?limit={}&offset={}", entity, limit, offset);
        let raw: Vec<serde_json::Value> = self.fetch_json(&route).await?;
        let fetched = raw.len();
        let records: Vec<ActivityRecord> = decode_lenient(&route, raw);
        Ok(ActivityPage { records, fetched })
    }

    /// `GET /accounts/{id-or-name}`
    pub async fn account(&self, id_or_name: &str) -> Result<Account> {
        let mut url = self.url("/accounts")?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(self.base_url.clone()))?
            .push(id_or_name);
        self.fetch_json_url(url).await
    }

    /// `GET /files/{id}` streamed to `path`
    pub async fn download_file(&self, file_id: u64, path: &Path) -> Result<u64> {
        self.download_to(&format!("/files/{}", file_id), path).await
    }

    fn url(&self, route: &str) -> Result<Url> {
        let raw = format!("{}{}", self.base_url, route);
        Url::parse(&raw).map_err(|_| ApiError::Url(raw))
    }

    async fn fetch_url(&self, url: Url) -> Result<reqwest::Response> {
        // Held until this request finishes, then cools down
        let _permit = self.permits.acquire().await?;
        let token = self.tokens.token().await?;
        let route = route_of(&url);

        let response = self.http.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }
            warn!(route = %route, status = status.as_u16(), "request failed");
            return Err(ApiError::Status {
                route,
                status: status.as_u16(),
                body,
            });
        }

        debug!(route = %route, status = status.as_u16(), "request ok");
        Ok(response)
    }

    async fn fetch_json_url<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let route = route_of(&url);
        let bytes = self.fetch_url(url).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode { route, source })
    }
}

fn route_of(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Decode each element on its own, logging and skipping the bad ones
fn decode_lenient<T: DeserializeOwned>(route: &str, values: Vec<serde_json::Value>) -> Vec<T> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(route, index, error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}
