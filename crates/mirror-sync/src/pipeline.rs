// Per-language sync cycle
//
// Drives one language through probe, download, extract, migrate and version
// stages, strictly in sequence. The cycle never returns an error from `run`;
// every failure is folded into the outcome so the orchestrator can report
// per-language results without one language affecting another.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::SyncConfig;
use crate::downloader::BundleDownloader;
use crate::extractor::extract_bundle;
use crate::loader::{BatchLoader, TableOutcome};
use crate::probe::{is_outdated, VersionProbe};
use crate::source::ManifestSource;
use crate::store::{ContentStore, StoreProvider};
use crate::{Result, SyncError};

/// Pipeline stage, recorded on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Probing,
    Downloading,
    Extracting,
    Migrating,
    Versioning,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Probing => "probing",
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
            Stage::Migrating => "migrating",
            Stage::Versioning => "versioning",
        };
        write!(f, "{}", name)
    }
}

/// Terminal state of one language's cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// The remote published nothing usable for this language
    NoUpdate,
    /// Stored version matches the published one; nothing to do
    UpToDate,
    /// All tables replaced and the version marker advanced
    Versioned { version: String },
    /// The cycle aborted; tables already migrated are in `CycleOutcome::tables`
    Failed { stage: Stage, error: String },
}

/// Result of one language's cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub language: String,
    pub status: CycleStatus,
    pub tables: Vec<TableOutcome>,
}

impl CycleOutcome {
    pub fn is_versioned(&self) -> bool {
        matches!(self.status, CycleStatus::Versioned { .. })
    }

    pub(crate) fn failed(language: &str, stage: Stage, error: &SyncError) -> Self {
        CycleOutcome {
            language: language.to_string(),
            status: CycleStatus::Failed {
                stage,
                error: error.to_string(),
            },
            tables: Vec::new(),
        }
    }
}

/// One language's refresh cycle.
///
/// Construction is the two-phase half: directories are created and the store
/// namespace is opened before a ready value is returned. `run` is the other
/// half and may be called once per scheduled trigger.
pub struct LanguageCycle {
    language: String,
    config: SyncConfig,
    store: Arc<dyn ContentStore>,
    probe: VersionProbe,
    downloader: BundleDownloader,
    archive_path: PathBuf,
    database_path: PathBuf,
}

impl LanguageCycle {
    /// Perform all fallible setup and return a ready-to-run cycle
    pub async fn new(
        language: &str,
        config: SyncConfig,
        provider: &dyn StoreProvider,
    ) -> Result<Self> {
        config.ensure_dirs().await?;
        let store = provider.open(language).await?;

        Ok(LanguageCycle {
            language: language.to_string(),
            archive_path: config.archive_path(language),
            database_path: config.database_path(language),
            probe: VersionProbe::new(config.clone())?,
            downloader: BundleDownloader::new(config.clone())?,
            config,
            store,
        })
    }

    /// Run one full cycle for this language
    pub async fn run(&self) -> CycleOutcome {
        let language = &self.language;

        // Probing
        let descriptor = match self.probe.fetch_descriptor(language).await {
            Ok(d) => d,
            Err(e) => return CycleOutcome::failed(language, Stage::Probing, &e),
        };
        if descriptor.is_empty() {
            info!(language = %language, "No manifest published, skipping");
            return CycleOutcome {
                language: language.clone(),
                status: CycleStatus::NoUpdate,
                tables: Vec::new(),
            };
        }

        let stored = match self.store.current_version().await {
            Ok(v) => v,
            Err(e) => return CycleOutcome::failed(language, Stage::Probing, &e),
        };
        if !is_outdated(&descriptor, stored.as_deref()) {
            info!(language = %language, version = %descriptor.version, "Local manifest is up to date");
            return CycleOutcome {
                language: language.clone(),
                status: CycleStatus::UpToDate,
                tables: Vec::new(),
            };
        }
        info!(
            language = %language,
            stored = %stored.unwrap_or_default(),
            published = %descriptor.version,
            "Local manifest is outdated, updating"
        );

        // Downloading
        if let Err(e) = self.downloader.download(&descriptor, &self.archive_path).await {
            return CycleOutcome::failed(language, Stage::Downloading, &e);
        }

        // Extracting (an invalid archive is tolerated; migration will then
        // fail against whatever is, or is not, at the database path)
        if let Err(e) = extract_bundle(&self.archive_path, &self.database_path).await {
            return CycleOutcome::failed(language, Stage::Extracting, &e);
        }

        // Migrating, one table at a time to bound memory and connections
        let source = ManifestSource::new(&self.database_path);
        let loader = BatchLoader::new(self.store.clone(), self.config.batch_size);

        let table_names = match source.table_names().await {
            Ok(names) => names,
            Err(e) => return CycleOutcome::failed(language, Stage::Migrating, &e),
        };

        let mut tables = Vec::with_capacity(table_names.len());
        for table in &table_names {
            let schema = match source.table_schema(table).await {
                Ok(schema) => schema,
                Err(e) => {
                    return CycleOutcome {
                        language: language.clone(),
                        status: CycleStatus::Failed {
                            stage: Stage::Migrating,
                            error: e.to_string(),
                        },
                        tables,
                    }
                },
            };
            match loader.load_table(table, &source, &schema).await {
                Ok(outcome) => tables.push(outcome),
                Err(e) => {
                    return CycleOutcome {
                        language: language.clone(),
                        status: CycleStatus::Failed {
                            stage: Stage::Migrating,
                            error: e.to_string(),
                        },
                        tables,
                    }
                },
            }
        }

        // Versioning; on failure the next cycle re-migrates (self-healing)
        if let Err(e) = self.store.record_version(&descriptor.version).await {
            return CycleOutcome {
                language: language.clone(),
                status: CycleStatus::Failed {
                    stage: Stage::Versioning,
                    error: e.to_string(),
                },
                tables,
            };
        }

        info!(language = %language, version = %descriptor.version, "Manifest update complete");
        CycleOutcome {
            language: language.clone(),
            status: CycleStatus::Versioned {
                version: descriptor.version,
            },
            tables,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::Event;
    use crate::store::MemoryStoreProvider;
    use rusqlite::Connection;
    use std::io::Write;
    use std::path::Path;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn bundle_bytes(dir: &Path) -> Vec<u8> {
        let db_path = dir.join("fixture.content");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE ExampleTable (id INTEGER PRIMARY KEY, json TEXT);
            INSERT INTO ExampleTable (id, json) VALUES (-5, '{"a":1}');
            INSERT INTO ExampleTable (id, json) VALUES (10, '{"b":2}');
            CREATE TABLE OtherTable (id INTEGER PRIMARY KEY, json TEXT);
            INSERT INTO OtherTable (id, json) VALUES (1, '{"c":3}');
            "#,
        )
        .unwrap();
        drop(conn);

        let db_bytes = std::fs::read(&db_path).unwrap();
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("world_content.content", FileOptions::default())
            .unwrap();
        writer.write_all(&db_bytes).unwrap();
        writer.finish().unwrap().into_inner()
    }

    async fn mock_manifest_info(server: &MockServer, version: &str) {
        Mock::given(method("GET"))
            .and(url_path("/api/manifest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "version": version,
                "bundlePaths": { "en": "/bundles/en.zip" }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_full_cycle_versions_after_all_tables() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mock_manifest_info(&server, "100.1.0").await;
        Mock::given(method("GET"))
            .and(url_path("/bundles/en.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle_bytes(dir.path())))
            .mount(&server)
            .await;

        let config = SyncConfig::test_config(&server.uri(), dir.path());
        let provider = MemoryStoreProvider::new();
        let cycle = LanguageCycle::new("en", config, &provider).await.unwrap();

        let outcome = cycle.run().await;
        assert!(outcome.is_versioned(), "unexpected outcome: {:?}", outcome);
        assert_eq!(outcome.tables.len(), 2);

        let store = provider.store("en");
        assert_eq!(store.version(), Some("100.1.0".to_string()));

        // The version marker must be written strictly after every table event
        let events = store.events();
        let version_idx = events
            .iter()
            .position(|e| matches!(e, Event::RecordVersion { .. }))
            .unwrap();
        assert_eq!(version_idx, events.len() - 1);
        assert!(events[..version_idx]
            .iter()
            .all(|e| matches!(e, Event::Reset { .. } | Event::Insert { .. })));
    }

    #[tokio::test]
    async fn test_tables_migrate_sequentially() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mock_manifest_info(&server, "100.1.0").await;
        Mock::given(method("GET"))
            .and(url_path("/bundles/en.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle_bytes(dir.path())))
            .mount(&server)
            .await;

        let config = SyncConfig::test_config(&server.uri(), dir.path());
        let provider = MemoryStoreProvider::new();
        let cycle = LanguageCycle::new("en", config, &provider).await.unwrap();
        cycle.run().await;

        // ExampleTable sorts before OtherTable; its events must all precede
        // the other table's reset
        let events = provider.store("en").events();
        let other_reset = events
            .iter()
            .position(|e| matches!(e, Event::Reset { table } if table == "OtherTable"))
            .unwrap();
        assert!(events[..other_reset].iter().any(
            |e| matches!(e, Event::Insert { table, .. } if table == "ExampleTable")
        ));
    }

    #[tokio::test]
    async fn test_version_record_failure_reports_migrated_tables() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mock_manifest_info(&server, "100.1.0").await;
        Mock::given(method("GET"))
            .and(url_path("/bundles/en.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle_bytes(dir.path())))
            .mount(&server)
            .await;

        let provider = MemoryStoreProvider::new();
        let store = provider.store("en");
        store.record_version("99.0.0").await.unwrap();
        store.fail_version_record();

        let config = SyncConfig::test_config(&server.uri(), dir.path());
        let cycle = LanguageCycle::new("en", config, &provider).await.unwrap();

        let outcome = cycle.run().await;
        match &outcome.status {
            CycleStatus::Failed { stage, .. } => assert_eq!(*stage, Stage::Versioning),
            other => panic!("expected versioning failure, got {:?}", other),
        }
        // Every table migrated before the marker write failed
        assert_eq!(outcome.tables.len(), 2);
        assert!(outcome.tables.iter().all(|t| t.is_complete()));
        // The old marker survives, so the next cycle re-migrates
        assert_eq!(store.version(), Some("99.0.0".to_string()));
    }

    #[tokio::test]
    async fn test_up_to_date_short_circuits() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mock_manifest_info(&server, "100.1.0").await;
        // No bundle mock mounted: a download attempt would fail the cycle

        let provider = MemoryStoreProvider::new();
        provider.store("en").record_version("100.1.0").await.unwrap();

        let config = SyncConfig::test_config(&server.uri(), dir.path());
        let cycle = LanguageCycle::new("en", config, &provider).await.unwrap();

        let outcome = cycle.run().await;
        assert_eq!(outcome.status, CycleStatus::UpToDate);
        assert!(outcome.tables.is_empty());
    }

    #[tokio::test]
    async fn test_missing_language_is_no_update() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mock_manifest_info(&server, "100.1.0").await;

        let config = SyncConfig::test_config(&server.uri(), dir.path());
        let provider = MemoryStoreProvider::new();
        let cycle = LanguageCycle::new("fr", config, &provider).await.unwrap();

        let outcome = cycle.run().await;
        assert_eq!(outcome.status, CycleStatus::NoUpdate);
    }

    #[tokio::test]
    async fn test_probe_failure_is_contained() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        Mock::given(method("GET"))
            .and(url_path("/api/manifest"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = SyncConfig::test_config(&server.uri(), dir.path());
        let provider = MemoryStoreProvider::new();
        let cycle = LanguageCycle::new("en", config, &provider).await.unwrap();

        match cycle.run().await.status {
            CycleStatus::Failed { stage, .. } => assert_eq!(stage, Stage::Probing),
            other => panic!("expected probe failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_bundle_skips_extraction_then_fails_migrating() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        mock_manifest_info(&server, "100.1.0").await;
        Mock::given(method("GET"))
            .and(url_path("/bundles/en.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a zip".to_vec()))
            .mount(&server)
            .await;

        let config = SyncConfig::test_config(&server.uri(), dir.path());
        let provider = MemoryStoreProvider::new();
        let cycle = LanguageCycle::new("en", config, &provider).await.unwrap();

        // Extraction tolerates the bad archive; with no prior extracted
        // database on disk the migration stage is where the cycle fails
        match cycle.run().await.status {
            CycleStatus::Failed { stage, .. } => assert_eq!(stage, Stage::Migrating),
            other => panic!("expected migrating failure, got {:?}", other),
        }
        assert_eq!(provider.store("en").version(), None);
    }
}
