// Embedded manifest database access
//
// The extracted bundle is a SQLite file whose schema is only known at
// runtime. This module discovers it fresh on every migration (it can change
// between manifest versions) and streams table rows through a bounded
// channel so that at most one chunk of rows is resident at a time.

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Result, SyncError};

/// Name of the column holding the serialized entity document
pub const PAYLOAD_COLUMN: &str = "json";

/// A row as read from the source, column name to raw value
pub type RawRow = HashMap<String, Value>;

/// Column metadata from schema introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub declared_type: String,
    pub is_primary_key: bool,
}

/// Ordered column map for one source table.
///
/// Discovered fresh on every migration; never cached across cycles.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    columns: Vec<(String, ColumnInfo)>,
}

impl TableSchema {
    /// Build a schema from an ordered column list
    pub fn from_columns(columns: Vec<(String, ColumnInfo)>) -> Self {
        TableSchema { columns }
    }

    /// Look up a column by name
    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, info)| info)
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// The single primary-key column.
    ///
    /// The manifest contract guarantees exactly one; anything else fails
    /// fast rather than risk mis-mapping columns downstream.
    pub fn primary_key(&self) -> Result<&str> {
        let mut keys = self
            .columns
            .iter()
            .filter(|(_, info)| info.is_primary_key)
            .map(|(name, _)| name.as_str());

        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key),
            (None, _) => Err(SyncError::Schema(
                "table has no primary-key column".to_string(),
            )),
            (Some(_), Some(_)) => Err(SyncError::Schema(
                "table has more than one primary-key column".to_string(),
            )),
        }
    }

    /// The payload column, conventionally named `json`
    pub fn payload_column(&self) -> Result<&str> {
        self.get(PAYLOAD_COLUMN)
            .map(|_| PAYLOAD_COLUMN)
            .ok_or_else(|| SyncError::Schema(format!("table has no {:?} column", PAYLOAD_COLUMN)))
    }
}

/// Read-only handle on an extracted manifest database
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ManifestSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content table names, alphabetically ordered, internal tables excluded
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_read_only(&path)?;
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await?
    }

    /// Introspect one table's columns via `PRAGMA table_info`
    pub async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        let table = mirror_common::ident::validate(table)?.to_string();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = open_read_only(&path)?;
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
            let columns = stmt
                .query_map([], |row| {
                    let name: String = row.get(1)?;
                    let declared_type: String = row.get(2)?;
                    let pk: i64 = row.get(5)?;
                    Ok((
                        name,
                        ColumnInfo {
                            declared_type,
                            is_primary_key: pk > 0,
                        },
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if columns.is_empty() {
                return Err(SyncError::Schema(format!("no such table: {}", table)));
            }

            debug!(table = %table, columns = columns.len(), "Discovered table schema");
            Ok(TableSchema { columns })
        })
        .await?
    }

    /// Stream all rows of a table in chunks of `chunk_size`.
    ///
    /// A blocking task walks `SELECT * FROM <table>` and feeds a bounded
    /// channel; dropping the receiver stops the reader. Each call reopens
    /// the table, so the stream is restartable.
    pub fn stream_rows(
        &self,
        table: &str,
        chunk_size: usize,
    ) -> Result<mpsc::Receiver<Result<Vec<RawRow>>>> {
        let table = mirror_common::ident::validate(table)?.to_string();
        let path = self.path.clone();
        let (tx, rx) = mpsc::channel::<Result<Vec<RawRow>>>(1);

        tokio::task::spawn_blocking(move || {
            if let Err(e) = read_rows_blocking(&path, &table, chunk_size, &tx) {
                // Receiver may already be gone; nothing more to do then.
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(rx)
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY,
    )?)
}

fn read_rows_blocking(
    path: &Path,
    table: &str,
    chunk_size: usize,
    tx: &mpsc::Sender<Result<Vec<RawRow>>>,
) -> Result<()> {
    let conn = open_read_only(path)?;
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", table))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut chunk: Vec<RawRow> = Vec::with_capacity(chunk_size);

    while let Some(row) = rows.next()? {
        let mut raw = RawRow::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            raw.insert(name.clone(), row.get::<_, Value>(idx)?);
        }
        chunk.push(raw);

        if chunk.len() >= chunk_size {
            let full = std::mem::replace(&mut chunk, Vec::with_capacity(chunk_size));
            if tx.blocking_send(Ok(full)).is_err() {
                return Ok(());
            }
        }
    }

    if !chunk.is_empty() {
        let _ = tx.blocking_send(Ok(chunk));
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
