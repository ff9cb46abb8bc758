// Destination content store
//
// One store instance covers one language's namespace. Within a cycle the
// pipeline is the only writer; the serving layer reads concurrently but
// never mutates.

use async_trait::async_trait;
use std::sync::Arc;

use crate::transform::Record;
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, MemoryStoreProvider};
pub use postgres::{PgContentStore, PgStoreProvider};

/// Name of the version-marker table inside each namespace
pub const VERSION_TABLE: &str = "manifest_version";

/// Fixed key of the version-marker singleton
pub const VERSION_KEY: i32 = 1;

/// Per-language destination namespace
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Version of the manifest currently loaded, if any
    async fn current_version(&self) -> Result<Option<String>>;

    /// Drop and recreate a content table, clearing the prior version's rows
    async fn reset_table(&self, table: &str) -> Result<()>;

    /// Bulk-insert one batch of records into a content table
    async fn insert_batch(&self, table: &str, records: &[Record]) -> Result<()>;

    /// Upsert the version marker; the last step of a language's cycle
    async fn record_version(&self, version: &str) -> Result<()>;
}

/// Opens a per-language store namespace.
///
/// `open` performs all fallible setup (namespace creation, marker table) so
/// the returned store is ready for use.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn open(&self, language: &str) -> Result<Arc<dyn ContentStore>>;
}
