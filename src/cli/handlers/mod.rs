//! CLI command handlers module
//!
//! This module is organized by functional domains:
//! - init: Database initialization
//! - ingest: Batch ingestion
//! - search: Campaign search and aggregates
//! - recovery: Retry, reconcile, statistics and dead letters
//! - info: Information display (config)

pub mod info;
pub mod ingest;
pub mod init;
pub mod recovery;
pub mod search;

// Re-export all public handlers
pub use info::*;
pub use ingest::*;
pub use init::*;
pub use recovery::*;
pub use search::*;
