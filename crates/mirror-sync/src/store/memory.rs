// In-memory content store
//
// Used by unit and integration tests, and handy for dry runs. Records every
// store call so tests can assert on ordering and batch shapes, and can be
// told to fail inserts for a given table to exercise the partial-success
// path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ContentStore, StoreProvider};
use crate::transform::Record;
use crate::{Result, SyncError};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, BTreeMap<i64, Json>>,
    version: Option<(String, DateTime<Utc>)>,
    failing_tables: HashSet<String>,
    failing_version_record: bool,
    events: Vec<Event>,
}

/// A store call, recorded in invocation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Reset { table: String },
    Insert { table: String, batch_size: usize },
    RecordVersion { version: String },
}

/// In-memory implementation of [`ContentStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-call
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make subsequent inserts into `table` fail
    pub fn fail_inserts_for(&self, table: &str) {
        self.lock().failing_tables.insert(table.to_string());
    }

    /// Make subsequent version-marker writes fail
    pub fn fail_version_record(&self) {
        self.lock().failing_version_record = true;
    }

    /// Snapshot of one table's contents
    pub fn table(&self, name: &str) -> Option<BTreeMap<i64, Json>> {
        self.lock().tables.get(name).cloned()
    }

    /// Currently recorded version, if any
    pub fn version(&self) -> Option<String> {
        self.lock().version.as_ref().map(|(v, _)| v.clone())
    }

    /// All store calls in invocation order
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Batch sizes observed for one table, in order
    pub fn insert_batch_sizes(&self, table: &str) -> Vec<usize> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Insert { table: t, batch_size } if t == table => Some(*batch_size),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn current_version(&self) -> Result<Option<String>> {
        Ok(self.version())
    }

    async fn reset_table(&self, table: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.events.push(Event::Reset {
            table: table.to_string(),
        });
        inner.tables.insert(table.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn insert_batch(&self, table: &str, records: &[Record]) -> Result<()> {
        let mut inner = self.lock();
        inner.events.push(Event::Insert {
            table: table.to_string(),
            batch_size: records.len(),
        });

        if inner.failing_tables.contains(table) {
            return Err(SyncError::Io(std::io::Error::other(
                "injected insert failure",
            )));
        }

        let rows = inner.tables.entry(table.to_string()).or_default();
        for record in records {
            rows.insert(record.id, record.payload.clone());
        }
        Ok(())
    }

    async fn record_version(&self, version: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.events.push(Event::RecordVersion {
            version: version.to_string(),
        });

        if inner.failing_version_record {
            return Err(SyncError::Io(std::io::Error::other(
                "injected version record failure",
            )));
        }

        inner.version = Some((version.to_string(), Utc::now()));
        Ok(())
    }
}

/// Hands out one [`MemoryStore`] per language
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreProvider {
    stores: Arc<Mutex<HashMap<String, MemoryStore>>>,
}

impl MemoryStoreProvider {
    pub fn new() -> Self {
        MemoryStoreProvider::default()
    }

    /// The store backing a language, created on first use
    pub fn store(&self, language: &str) -> MemoryStore {
        let mut stores = self
            .stores
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        stores.entry(language.to_string()).or_default().clone()
    }
}

#[async_trait]
impl StoreProvider for MemoryStoreProvider {
    async fn open(&self, language: &str) -> Result<Arc<dyn ContentStore>> {
        mirror_common::ident::normalize_language(language)?;
        Ok(Arc::new(self.store(language)))
    }
}

// ============================================================================
// Tests
// ============================================================================
