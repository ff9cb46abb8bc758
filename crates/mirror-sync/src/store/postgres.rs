// PostgreSQL content store
//
// Each language maps to a schema named `{prefix}_{language}`; each source
// table becomes `(id BIGINT PRIMARY KEY, payload JSONB)` inside it. Table
// and schema names cannot be bound as parameters, so every name is validated
// before interpolation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use tracing::debug;

use super::{ContentStore, StoreProvider, VERSION_KEY, VERSION_TABLE};
use crate::transform::Record;
use crate::Result;

/// Opens PostgreSQL namespaces from a shared connection pool
#[derive(Debug, Clone)]
pub struct PgStoreProvider {
    pool: PgPool,
    prefix: String,
}

impl PgStoreProvider {
    pub fn new(pool: PgPool, prefix: impl Into<String>) -> Self {
        PgStoreProvider {
            pool,
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl StoreProvider for PgStoreProvider {
    async fn open(&self, language: &str) -> Result<Arc<dyn ContentStore>> {
        let prefix = mirror_common::ident::validate(&self.prefix)?;
        let language = mirror_common::ident::normalize_language(language)?;
        let namespace = format!("{}_{}", prefix, language);

        let store = PgContentStore::open(self.pool.clone(), namespace).await?;
        Ok(Arc::new(store))
    }
}

/// One language's namespace in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgContentStore {
    pool: PgPool,
    namespace: String,
}

impl PgContentStore {
    /// Open a namespace, creating the schema and version-marker table if
    /// absent. The namespace must already be a validated identifier.
    pub async fn open(pool: PgPool, namespace: String) -> Result<Self> {
        mirror_common::ident::validate(&namespace)?;

        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", namespace))
            .execute(&pool)
            .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                id INT PRIMARY KEY,
                version TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            namespace, VERSION_TABLE
        ))
        .execute(&pool)
        .await?;

        Ok(PgContentStore { pool, namespace })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn qualified(&self, table: &str) -> Result<String> {
        let table = mirror_common::ident::validate(table)?;
        Ok(format!("{}.{}", self.namespace, table))
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn current_version(&self) -> Result<Option<String>> {
        let version: Option<String> = sqlx::query_scalar(&format!(
            "SELECT version FROM {}.{} WHERE id = $1",
            self.namespace, VERSION_TABLE
        ))
        .bind(VERSION_KEY)
        .fetch_optional(&self.pool)
        .await?;

        Ok(version)
    }

    async fn reset_table(&self, table: &str) -> Result<()> {
        let qualified = self.qualified(table)?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", qualified))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE {} (id BIGINT PRIMARY KEY, payload JSONB NOT NULL)",
            qualified
        ))
        .execute(&self.pool)
        .await?;

        debug!(table = %qualified, "Reset destination table");
        Ok(())
    }

    async fn insert_batch(&self, table: &str, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let qualified = self.qualified(table)?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} (id, payload) ", qualified));
        builder.push_values(records, |mut b, record| {
            b.push_bind(record.id)
                .push_bind(sqlx::types::Json(record.payload.clone()));
        });

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn record_version(&self, version: &str) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {}.{} (id, version, updated_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE
             SET version = EXCLUDED.version, updated_at = EXCLUDED.updated_at",
            self.namespace, VERSION_TABLE
        ))
        .bind(VERSION_KEY)
        .bind(version)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
