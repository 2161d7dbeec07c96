//! Persistent tracking state
//!
//! This crate provides:
//! - Tracked entities and their observers
//! - Per-entity activity cursors (monotonic, survive restarts)
//!
//! Everything lives in one embedded sled database.

pub mod cursor;
pub mod entity;

// Re-exports
pub use cursor::{CursorError, CursorStore};
pub use entity::{ActivityId, EntityId, Observer, TrackedEntity};

/// Result type for cursor store operations
pub type Result<T> = std::result::Result<T, CursorError>;
