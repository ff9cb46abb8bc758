//! Manifest Mirror Sync Library
//!
//! Replicates a third-party, versioned content manifest (a zip archive
//! wrapping a single SQLite database, published per language) into a
//! queryable document store, replacing stale content table by table.
//!
//! # Pipeline
//!
//! - **Probe**: fetch the currently published version and bundle path
//! - **Download**: stream the bundle archive to disk
//! - **Extract**: unpack the embedded SQLite file
//! - **Migrate**: per table, discover the schema, stream rows, transform
//!   them into keyed JSON records, and bulk-load them in batches
//! - **Version**: record the manifest version once every table is loaded
//!
//! Languages are fully independent and synchronized concurrently; within one
//! language the stages run strictly in sequence.
//!
//! # Example
//!
//! ```no_run
//! use mirror_sync::config::SyncConfig;
//! use mirror_sync::orchestrator::Orchestrator;
//! use mirror_sync::store::MemoryStoreProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::from_env()?;
//!     let provider = Arc::new(MemoryStoreProvider::new());
//!     let report = Orchestrator::new(config, provider)?.run_all().await;
//!     println!("{} languages versioned", report.versioned_count());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod downloader;
pub mod extractor;
pub mod loader;
pub mod orchestrator;
pub mod pipeline;
pub mod probe;
pub mod source;
pub mod store;
pub mod transform;

// Re-export main types
pub use config::SyncConfig;
pub use downloader::BundleDownloader;
pub use extractor::{extract_bundle, ExtractOutcome};
pub use loader::{BatchLoader, TableOutcome};
pub use orchestrator::{Orchestrator, RunReport};
pub use pipeline::{CycleOutcome, CycleStatus, LanguageCycle, Stage};
pub use probe::{is_outdated, ManifestDescriptor, VersionProbe};
pub use source::{ManifestSource, RawRow, TableSchema};
pub use transform::{field, signed_to_unsigned, Record, RowTransformer};

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error types for manifest synchronization
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Source database error: {0}")]
    Source(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Payload decode error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task error: {0}")]
    Task(String),
}

impl From<mirror_common::ident::InvalidIdent> for SyncError {
    fn from(err: mirror_common::ident::InvalidIdent) -> Self {
        SyncError::Schema(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Task(err.to_string())
    }
}
