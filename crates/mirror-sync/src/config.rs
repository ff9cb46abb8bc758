// Sync pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Result, SyncError};

/// Default batch size for bulk inserts
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default HTTP timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default number of download attempts before a language's cycle fails
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default destination namespace prefix
pub const DEFAULT_NAMESPACE_PREFIX: &str = "manifest";

/// Configuration for the manifest synchronization pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote host publishing the manifest (scheme + authority)
    pub remote_host: String,

    /// Path of the manifest-info endpoint on the remote host
    pub manifest_info_path: String,

    /// Optional API key sent as `X-API-Key` on upstream requests
    pub api_key: Option<String>,

    /// Language locales to mirror (e.g., "en", "zh-cht")
    pub languages: Vec<String>,

    /// Root directory for downloaded archives and extracted databases
    pub data_dir: PathBuf,

    /// Destination namespace prefix; a language lands in `{prefix}_{language}`
    pub namespace_prefix: String,

    /// Number of records per bulk insert
    pub batch_size: usize,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,

    /// Maximum download attempts per cycle
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            remote_host: "https://content.example.net".to_string(),
            manifest_info_path: "/api/manifest".to_string(),
            api_key: None,
            languages: vec!["en".to_string()],
            data_dir: PathBuf::from("./data/manifest"),
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl SyncConfig {
    /// Create new config with builder pattern
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Full URL of the manifest-info endpoint
    pub fn manifest_info_url(&self) -> String {
        format!("{}{}", self.remote_host, self.manifest_info_path)
    }

    /// Full URL of a bundle, given the origin path reported by the probe
    pub fn bundle_url(&self, origin_path: &str) -> String {
        format!("{}{}", self.remote_host, origin_path)
    }

    /// Path of the downloaded archive for a language
    pub fn archive_path(&self, language: &str) -> PathBuf {
        self.data_dir.join("zip").join(format!("{}.zip", language))
    }

    /// Path of the extracted embedded database for a language
    pub fn database_path(&self, language: &str) -> PathBuf {
        self.data_dir
            .join("sqlite")
            .join(format!("{}.content", language))
    }

    /// Create the per-language directories if absent.
    ///
    /// The zip and sqlite directories are shared between languages but the
    /// files inside are language-scoped, so no locking is needed.
    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.data_dir.join("zip")).await?;
        tokio::fs::create_dir_all(self.data_dir.join("sqlite")).await?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.remote_host.is_empty() {
            return Err(SyncError::Config("Remote host cannot be empty".to_string()));
        }
        if !self.manifest_info_path.starts_with('/') {
            return Err(SyncError::Config(
                "Manifest info path must start with '/'".to_string(),
            ));
        }
        if self.languages.is_empty() {
            return Err(SyncError::Config(
                "At least one language must be configured".to_string(),
            ));
        }
        for language in &self.languages {
            mirror_common::ident::normalize_language(language)
                .map_err(|e| SyncError::Config(format!("Bad language code: {}", e)))?;
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config(
                "Batch size must be greater than 0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(SyncError::Config("Timeout must be greater than 0".to_string()));
        }
        if self.max_retries == 0 {
            return Err(SyncError::Config(
                "Max retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Environment Variable Support
// ============================================================================

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// - `MIRROR_REMOTE_HOST`: remote host publishing the manifest
    /// - `MIRROR_MANIFEST_INFO_PATH`: manifest-info endpoint path
    /// - `MIRROR_API_KEY`: upstream API key (optional)
    /// - `MIRROR_LANGUAGES`: comma-separated language list
    /// - `MIRROR_DATA_DIR`: local root for archives and databases
    /// - `MIRROR_NAMESPACE_PREFIX`: destination namespace prefix
    /// - `MIRROR_BATCH_SIZE`, `MIRROR_TIMEOUT_SECS`, `MIRROR_MAX_RETRIES`
    pub fn from_env() -> Result<Self> {
        let default = SyncConfig::default();

        let config = SyncConfig {
            remote_host: std::env::var("MIRROR_REMOTE_HOST").unwrap_or(default.remote_host),
            manifest_info_path: std::env::var("MIRROR_MANIFEST_INFO_PATH")
                .unwrap_or(default.manifest_info_path),
            api_key: std::env::var("MIRROR_API_KEY").ok(),
            languages: std::env::var("MIRROR_LANGUAGES")
                .map(|s| {
                    s.split(',')
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect()
                })
                .unwrap_or(default.languages),
            data_dir: std::env::var("MIRROR_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.data_dir),
            namespace_prefix: std::env::var("MIRROR_NAMESPACE_PREFIX")
                .unwrap_or(default.namespace_prefix),
            batch_size: std::env::var("MIRROR_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.batch_size),
            timeout_secs: std::env::var("MIRROR_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.timeout_secs),
            max_retries: std::env::var("MIRROR_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_retries),
        };

        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Preset Configurations
// ============================================================================

impl SyncConfig {
    /// Configuration for tests: single attempt, short timeout
    pub fn test_config(remote_host: &str, data_dir: &Path) -> Self {
        SyncConfig {
            remote_host: remote_host.to_string(),
            data_dir: data_dir.to_path_buf(),
            timeout_secs: 30,
            max_retries: 1,
            ..SyncConfig::default()
        }
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    remote_host: Option<String>,
    manifest_info_path: Option<String>,
    api_key: Option<String>,
    languages: Option<Vec<String>>,
    data_dir: Option<PathBuf>,
    namespace_prefix: Option<String>,
    batch_size: Option<usize>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

impl SyncConfigBuilder {
    pub fn remote_host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self
    }

    pub fn manifest_info_path(mut self, path: impl Into<String>) -> Self {
        self.manifest_info_path = Some(path.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn languages(mut self, languages: Vec<String>) -> Self {
        self.languages = Some(languages);
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_prefix = Some(prefix.into());
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn build(self) -> SyncConfig {
        let default = SyncConfig::default();

        SyncConfig {
            remote_host: self.remote_host.unwrap_or(default.remote_host),
            manifest_info_path: self.manifest_info_path.unwrap_or(default.manifest_info_path),
            api_key: self.api_key,
            languages: self.languages.unwrap_or(default.languages),
            data_dir: self.data_dir.unwrap_or(default.data_dir),
            namespace_prefix: self.namespace_prefix.unwrap_or(default.namespace_prefix),
            batch_size: self.batch_size.unwrap_or(default.batch_size),
            timeout_secs: self.timeout_secs.unwrap_or(default.timeout_secs),
            max_retries: self.max_retries.unwrap_or(default.max_retries),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.namespace_prefix, "manifest");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_manifest_info_url() {
        let config = SyncConfig::builder()
            .remote_host("https://host.example")
            .manifest_info_path("/api/manifest")
            .build();
        assert_eq!(config.manifest_info_url(), "https://host.example/api/manifest");
    }

    #[test]
    fn test_bundle_url() {
        let config = SyncConfig::builder().remote_host("https://host.example").build();
        assert_eq!(
            config.bundle_url("/bundles/en/content.zip"),
            "https://host.example/bundles/en/content.zip"
        );
    }

    #[test]
    fn test_local_paths_are_language_scoped() {
        let config = SyncConfig::builder().data_dir("/var/lib/mirror").build();
        assert_eq!(
            config.archive_path("en"),
            PathBuf::from("/var/lib/mirror/zip/en.zip")
        );
        assert_eq!(
            config.database_path("en"),
            PathBuf::from("/var/lib/mirror/sqlite/en.content")
        );
        assert_ne!(config.archive_path("en"), config.archive_path("de"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = SyncConfig::builder()
            .languages(vec!["en".to_string(), "zh-cht".to_string()])
            .batch_size(250)
            .max_retries(5)
            .build();

        assert_eq!(config.languages.len(), 2);
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_validate_rejects_empty_languages() {
        let config = SyncConfig::builder().languages(vec![]).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_language_code() {
        let config = SyncConfig::builder()
            .languages(vec!["en;drop".to_string()])
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = SyncConfig::builder().batch_size(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_test_config() {
        let config = SyncConfig::test_config("http://127.0.0.1:9", Path::new("/tmp/mirror"));
        assert_eq!(config.max_retries, 1);
        assert!(config.validate().is_ok());
    }
}
