// Row transformation
//
// Turns a raw source row into a destination record: the primary key gets the
// signed-to-unsigned fix-up, the payload column is decoded from its
// serialized form. The schema contract guarantees both columns exist, so a
// row missing either is a hard error rather than a silent skip.

use rusqlite::types::Value;
use serde_json::Value as Json;

use crate::source::{RawRow, TableSchema};
use crate::{Result, SyncError};

/// Destination unit of storage, keyed by `id`
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Unsigned 32-bit key, widened to fit the destination column
    pub id: i64,
    /// Decoded entity document
    pub payload: Json,
}

/// Map a source-signed 32-bit key into its unsigned equivalent.
///
/// The upstream manifest stores entity hashes as signed 32-bit integers;
/// consumers expect the unsigned value. The check is on sign, so re-applying
/// the fix-up to an already-converted value is a no-op.
pub fn signed_to_unsigned(id: i64) -> i64 {
    if id < 0 {
        id + (1i64 << 32)
    } else {
        id
    }
}

/// Access a named field of a decoded payload.
///
/// Payload shapes vary by table and manifest version, so there is no static
/// field mapping; absence is an expected outcome, not an error.
pub fn field<'a>(payload: &'a Json, name: &str) -> Option<&'a Json> {
    payload.get(name)
}

/// Converts raw rows of one table into destination records
#[derive(Debug, Clone)]
pub struct RowTransformer {
    primary_key: String,
    payload_column: String,
}

impl RowTransformer {
    /// Build a transformer for a table schema, validating its shape
    pub fn for_schema(schema: &TableSchema) -> Result<Self> {
        Ok(RowTransformer {
            primary_key: schema.primary_key()?.to_string(),
            payload_column: schema.payload_column()?.to_string(),
        })
    }

    /// Transform one row into a record
    pub fn transform(&self, row: &RawRow) -> Result<Record> {
        let id = match row.get(&self.primary_key) {
            Some(Value::Integer(id)) => signed_to_unsigned(*id),
            Some(other) => {
                return Err(SyncError::Transform(format!(
                    "primary key column {:?} holds non-integer value {:?}",
                    self.primary_key, other
                )))
            },
            None => {
                return Err(SyncError::Transform(format!(
                    "row is missing primary key column {:?}",
                    self.primary_key
                )))
            },
        };

        let payload = match row.get(&self.payload_column) {
            Some(Value::Text(text)) => serde_json::from_str(text)?,
            Some(Value::Blob(bytes)) => serde_json::from_slice(bytes)?,
            Some(other) => {
                return Err(SyncError::Transform(format!(
                    "payload column {:?} holds non-text value {:?}",
                    self.payload_column, other
                )))
            },
            None => {
                return Err(SyncError::Transform(format!(
                    "row is missing payload column {:?}",
                    self.payload_column
                )))
            },
        };

        Ok(Record { id, payload })
    }
}

// ============================================================================
// Tests
// ============================================================================
