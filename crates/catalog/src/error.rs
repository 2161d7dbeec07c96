//! Errors surfaced by the catalog client

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx answer; the body is kept for diagnostics
    #[error("{route} returned {status}: {body}")]
    Status {
        route: String,
        status: u16,
        body: String,
    },

    #[error(transparent)]
    Network(#[from] reqwest::Error),

    #[error("failed to decode response from {route}: {source}")]
    Decode {
        route: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("token exchange failed: {0}")]
    Auth(String),

    #[error("failed to write download to {path}: {source}")]
    Download {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid request url '{0}'")]
    Url(String),

    #[error("request permit pool is closed")]
    PoolClosed,
}

impl ApiError {
    /// HTTP status for request errors
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
