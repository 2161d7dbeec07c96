//! Seams between the polling loops and the catalog API

use async_trait::async_trait;
use cw_catalog::{ActivityPage, ApiError, ContentItem, RateLimitedClient};
use cw_journal::EntityId;
use std::path::Path;

/// Paged activity feed of an account, newest first
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn activity(
        &self,
        entity: EntityId,
        limit: usize,
        offset: usize,
    ) -> Result<ActivityPage, ApiError>;
}

/// Catalog listings, item details and file content
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn pending(&self) -> Result<Vec<ContentItem>, ApiError>;

    async fn item(&self, item_id: u64) -> Result<ContentItem, ApiError>;

    async fn download_file(&self, file_id: u64, path: &Path) -> Result<u64, ApiError>;
}

#[async_trait]
impl ActivitySource for RateLimitedClient {
    async fn activity(
        &self,
        entity: EntityId,
        limit: usize,
        offset: usize,
    ) -> Result<ActivityPage, ApiError> {
        RateLimitedClient::activity(self, entity, limit, offset).await
    }
}

#[async_trait]
impl CatalogSource for RateLimitedClient {
    async fn pending(&self) -> Result<Vec<ContentItem>, ApiError> {
        RateLimitedClient::pending(self).await
    }

    async fn item(&self, item_id: u64) -> Result<ContentItem, ApiError> {
        RateLimitedClient::item(self, item_id).await
    }

    async fn download_file(&self, file_id: u64, path: &Path) -> Result<u64, ApiError> {
        RateLimitedClient::download_file(self, file_id, path).await
    }
}
