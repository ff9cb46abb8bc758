// Batch loader
//
// Replaces one destination table with the transformed image of one source
// table. The destination is cleared before the first batch, so mid-load the
// table is in a transient partially-written state and never a mix of two
// versions. A failed batch is logged and counted but does not stop the
// remaining batches; the table outcome carries the damage report.

use std::sync::Arc;
use tracing::{error, info};

use crate::source::{ManifestSource, TableSchema};
use crate::store::ContentStore;
use crate::transform::{Record, RowTransformer};
use crate::Result;

/// Per-table migration result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    pub table: String,
    pub rows_loaded: u64,
    pub batches_failed: u32,
}

impl TableOutcome {
    /// True when every batch landed
    pub fn is_complete(&self) -> bool {
        self.batches_failed == 0
    }
}

/// Groups transformed records into fixed-size batches and bulk-loads them
pub struct BatchLoader {
    store: Arc<dyn ContentStore>,
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(store: Arc<dyn ContentStore>, batch_size: usize) -> Self {
        BatchLoader { store, batch_size }
    }

    /// Migrate one table: clear the destination, then stream, transform and
    /// load the source rows batch by batch.
    ///
    /// Source and transform errors abort the migration; insert failures do
    /// not (see `TableOutcome::batches_failed`).
    pub async fn load_table(
        &self,
        table: &str,
        source: &ManifestSource,
        schema: &TableSchema,
    ) -> Result<TableOutcome> {
        let transformer = RowTransformer::for_schema(schema)?;

        self.store.reset_table(table).await?;

        let mut rows = source.stream_rows(table, self.batch_size)?;
        let mut outcome = TableOutcome {
            table: table.to_string(),
            rows_loaded: 0,
            batches_failed: 0,
        };

        while let Some(chunk) = rows.recv().await {
            let chunk = chunk?;
            let batch: Vec<Record> = chunk
                .iter()
                .map(|row| transformer.transform(row))
                .collect::<Result<_>>()?;

            match self.store.insert_batch(table, &batch).await {
                Ok(()) => outcome.rows_loaded += batch.len() as u64,
                Err(e) => {
                    error!(table = %table, error = %e, "Batch insert failed, continuing");
                    outcome.batches_failed += 1;
                },
            }
        }

        info!(
            table = %table,
            rows = outcome.rows_loaded,
            failed_batches = outcome.batches_failed,
            "Table migration finished"
        );

        Ok(outcome)
    }
}

// ============================================================================
// Tests
// ============================================================================
