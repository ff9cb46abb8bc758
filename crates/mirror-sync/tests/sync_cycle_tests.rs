//! End-to-end sync cycle tests against a mocked remote.
//!
//! A fixture SQLite database is built, zipped and served over HTTP; the
//! pipeline runs against an in-memory store so assertions can inspect the
//! exact replicated content.

use mirror_sync::config::SyncConfig;
use mirror_sync::orchestrator::Orchestrator;
use mirror_sync::pipeline::{CycleStatus, Stage};
use mirror_sync::store::{ContentStore, MemoryStoreProvider};
use rusqlite::Connection;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::FileOptions;
use zip::ZipWriter;

/// Build a zipped fixture database with one content table
fn bundle_bytes(dir: &Path, name: &str) -> Vec<u8> {
    let db_path = dir.join(format!("{}.content", name));
    let conn = Connection::open(&db_path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE ExampleTable (id INTEGER PRIMARY KEY, json TEXT);
        INSERT INTO ExampleTable (id, json) VALUES (-5, '{"a":1}');
        INSERT INTO ExampleTable (id, json) VALUES (10, '{"b":2}');
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

async fn mock_manifest_info(server: &MockServer, version: &str, paths: serde_json::Value) {
    Mock::given(method("GET"))
        .and(url_path("/api/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "version": version,
            "bundlePaths": paths
        })))
        .mount(server)
        .await;
}

fn config_for(server: &MockServer, dir: &tempfile::TempDir, languages: &[&str]) -> SyncConfig {
    let mut config = SyncConfig::test_config(&server.uri(), dir.path());
    config.languages = languages.iter().map(|l| l.to_string()).collect();
    config
}

#[tokio::test]
async fn test_cycle_replicates_content_and_fixes_keys() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock_manifest_info(&server, "100.1.0", serde_json::json!({"en": "/bundles/en.zip"})).await;
    Mock::given(method("GET"))
        .and(url_path("/bundles/en.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle_bytes(dir.path(), "en")))
        .mount(&server)
        .await;

    let config = config_for(&server, &dir, &["en"]);
    let provider = Arc::new(MemoryStoreProvider::new());
    let orchestrator = Orchestrator::new(config, provider.clone()).unwrap();

    let report = orchestrator.run_all().await;
    assert_eq!(report.versioned_count(), 1);

    let store = provider.store("en");
    assert_eq!(store.version(), Some("100.1.0".to_string()));

    // Negative source keys come out unsigned; positive ones are untouched
    let table = store.table("ExampleTable").unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(&4_294_967_291), Some(&serde_json::json!({"a": 1})));
    assert_eq!(table.get(&10), Some(&serde_json::json!({"b": 2})));
}

#[tokio::test]
async fn test_second_run_is_up_to_date() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock_manifest_info(&server, "100.1.0", serde_json::json!({"en": "/bundles/en.zip"})).await;
    Mock::given(method("GET"))
        .and(url_path("/bundles/en.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle_bytes(dir.path(), "en")))
        // The bundle must only be fetched on the first run
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server, &dir, &["en"]);
    let provider = Arc::new(MemoryStoreProvider::new());
    let orchestrator = Orchestrator::new(config, provider.clone()).unwrap();

    let first = orchestrator.run_all().await;
    assert_eq!(first.versioned_count(), 1);

    let second = orchestrator.run_all().await;
    assert_eq!(second.versioned_count(), 0);
    assert_eq!(second.outcomes[0].status, CycleStatus::UpToDate);
}

#[tokio::test]
async fn test_languages_fail_independently() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock_manifest_info(
        &server,
        "100.1.0",
        serde_json::json!({"en": "/bundles/en.zip", "fr": "/bundles/fr.zip"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(url_path("/bundles/en.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle_bytes(dir.path(), "en")))
        .mount(&server)
        .await;
    // No mock for fr: its download 404s

    let config = config_for(&server, &dir, &["en", "fr"]);
    let provider = Arc::new(MemoryStoreProvider::new());
    let orchestrator = Orchestrator::new(config, provider.clone()).unwrap();

    let report = orchestrator.run_all().await;
    assert_eq!(report.versioned_count(), 1);
    assert_eq!(report.failed_count(), 1);

    let en = &report.outcomes[0];
    assert!(en.is_versioned());
    assert_eq!(provider.store("en").version(), Some("100.1.0".to_string()));

    let fr = &report.outcomes[1];
    match &fr.status {
        CycleStatus::Failed { stage, .. } => assert_eq!(*stage, Stage::Downloading),
        other => panic!("expected download failure, got {:?}", other),
    }
    // The failed language's store is untouched
    assert_eq!(provider.store("fr").version(), None);
    assert!(provider.store("fr").table("ExampleTable").is_none());
}

#[tokio::test]
async fn test_new_version_replaces_content() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock_manifest_info(&server, "100.1.0", serde_json::json!({"en": "/bundles/en.zip"})).await;
    Mock::given(method("GET"))
        .and(url_path("/bundles/en.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bundle_bytes(dir.path(), "en")))
        .mount(&server)
        .await;

    let config = config_for(&server, &dir, &["en"]);
    let provider = Arc::new(MemoryStoreProvider::new());

    // Seed the store as if an older version had been loaded
    let store = provider.store("en");
    store.record_version("99.0.0").await.unwrap();

    let orchestrator = Orchestrator::new(config, provider.clone()).unwrap();
    let report = orchestrator.run_all().await;
    assert_eq!(report.versioned_count(), 1);
    assert_eq!(store.version(), Some("100.1.0".to_string()));
}
