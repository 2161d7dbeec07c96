//! CLI command implementations

pub mod archive;
pub mod config;
pub mod diff;
pub mod log;
pub mod resync;
pub mod start;
pub mod sync;
pub mod track;
pub mod tracked;
pub mod untrack;
