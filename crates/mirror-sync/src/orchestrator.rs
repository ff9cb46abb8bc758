// Run orchestration
//
// Fans one sync cycle out per configured language on its own task and
// collects the outcomes. Languages are fully independent: a failure in one
// never stops, delays or taints another.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::pipeline::{CycleOutcome, CycleStatus, LanguageCycle, Stage};
use crate::store::StoreProvider;
use crate::{Result, SyncError};

/// Outcomes of one full run across all configured languages
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<CycleOutcome>,
}

impl RunReport {
    pub fn versioned_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_versioned()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, CycleStatus::Failed { .. }))
            .count()
    }

    /// True when no language ended in a failed state
    pub fn is_clean(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Drives sync cycles across the configured languages
pub struct Orchestrator {
    config: SyncConfig,
    provider: Arc<dyn StoreProvider>,
}

impl Orchestrator {
    pub fn new(config: SyncConfig, provider: Arc<dyn StoreProvider>) -> Result<Self> {
        config.validate()?;
        Ok(Orchestrator { config, provider })
    }

    /// Run one cycle for a single language
    pub async fn run_language(&self, language: &str) -> CycleOutcome {
        match LanguageCycle::new(language, self.config.clone(), self.provider.as_ref()).await {
            Ok(cycle) => cycle.run().await,
            Err(e) => CycleOutcome::failed(language, Stage::Setup, &e),
        }
    }

    /// Run one cycle for every configured language concurrently
    pub async fn run_all(&self) -> RunReport {
        info!(languages = ?self.config.languages, "Starting sync run");

        let handles: Vec<_> = self
            .config
            .languages
            .iter()
            .map(|language| {
                let language = language.clone();
                let config = self.config.clone();
                let provider = self.provider.clone();
                tokio::spawn(async move {
                    match LanguageCycle::new(&language, config, provider.as_ref()).await {
                        Ok(cycle) => cycle.run().await,
                        Err(e) => CycleOutcome::failed(&language, Stage::Setup, &e),
                    }
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (language, handle) in self.config.languages.iter().zip(join_all(handles).await) {
            let outcome = match handle {
                Ok(outcome) => outcome,
                Err(e) => CycleOutcome::failed(language, Stage::Setup, &SyncError::from(e)),
            };

            match &outcome.status {
                CycleStatus::Versioned { version } => {
                    info!(language = %outcome.language, version = %version, "Language synced");
                },
                CycleStatus::UpToDate => {
                    info!(language = %outcome.language, "Language already up to date");
                },
                CycleStatus::NoUpdate => {
                    warn!(language = %outcome.language, "No manifest available for language");
                },
                CycleStatus::Failed { stage, error } => {
                    error!(
                        language = %outcome.language,
                        stage = %stage,
                        error = %error,
                        "Language sync failed"
                    );
                },
            }
            outcomes.push(outcome);
        }

        let report = RunReport { outcomes };
        info!(
            versioned = report.versioned_count(),
            failed = report.failed_count(),
            total = report.outcomes.len(),
            "Sync run finished"
        );
        report
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStoreProvider;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, dir: &tempfile::TempDir, languages: &[&str]) -> SyncConfig {
        let mut config = SyncConfig::test_config(&server.uri(), dir.path());
        config.languages = languages.iter().map(|l| l.to_string()).collect();
        config
    }

    #[tokio::test]
    async fn test_run_all_covers_every_language() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        // Empty paths map: every language resolves to NoUpdate
        Mock::given(method("GET"))
            .and(url_path("/api/manifest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "version": "100.1.0",
                "bundlePaths": {}
            })))
            .mount(&server)
            .await;

        let config = config_for(&server, &dir, &["en", "fr", "de"]);
        let provider = Arc::new(MemoryStoreProvider::new());
        let orchestrator = Orchestrator::new(config, provider).unwrap();

        let report = orchestrator.run_all().await;
        assert_eq!(report.outcomes.len(), 3);
        assert!(report.is_clean());
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.status == CycleStatus::NoUpdate));
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_language() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        // "fr" is advertised but its bundle 404s; "en" is not advertised
        Mock::given(method("GET"))
            .and(url_path("/api/manifest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "version": "100.1.0",
                "bundlePaths": { "fr": "/bundles/fr.zip" }
            })))
            .mount(&server)
            .await;

        let config = config_for(&server, &dir, &["en", "fr"]);
        let provider = Arc::new(MemoryStoreProvider::new());
        let orchestrator = Orchestrator::new(config, provider.clone()).unwrap();

        let report = orchestrator.run_all().await;
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failed_count(), 1);

        let en = &report.outcomes[0];
        assert_eq!(en.status, CycleStatus::NoUpdate);

        let fr = &report.outcomes[1];
        match &fr.status {
            CycleStatus::Failed { stage, .. } => assert_eq!(*stage, Stage::Downloading),
            other => panic!("expected download failure, got {:?}", other),
        }
        assert_eq!(provider.store("fr").version(), None);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SyncConfig::test_config("http://localhost:1", dir.path());
        config.batch_size = 0;

        let provider = Arc::new(MemoryStoreProvider::new());
        assert!(Orchestrator::new(config, provider).is_err());
    }
}
