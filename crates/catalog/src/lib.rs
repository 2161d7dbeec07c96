//! Catwatch Catalog - client for the external catalog service
//!
//! This crate provides:
//! - A weighted permit pool with delayed release to stay under the
//!   provider's per-minute quota
//! - Client-credentials token caching with serialized refresh
//! - Typed catalog endpoints and streaming file downloads

pub mod client;
pub mod error;
pub mod permits;
pub mod token;
pub mod types;

pub use client::{ClientConfig, RateLimitedClient};
pub use error::{ApiError, Result};
pub use permits::{Permit, PermitPool};
pub use token::{Credentials, TokenCache};
pub use types::{Account, ActivityPage, ActivityRecord, ContentItem, ItemFile, INTERESTING_ACTIVITY};
