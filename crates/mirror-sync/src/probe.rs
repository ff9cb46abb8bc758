// Manifest version probe
//
// Asks the remote service which manifest version is currently published and
// where the per-language bundle lives. The probe is read-only; deciding what
// to do with the answer is the pipeline's job.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::config::SyncConfig;
use crate::{Result, SyncError};

/// Remote bundle currently published for a language.
///
/// An empty version or origin path means the remote did not report anything
/// usable for this language; the migration is skipped, not failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDescriptor {
    pub language: String,
    pub version: String,
    pub origin_path: String,
}

impl ManifestDescriptor {
    fn empty(language: &str) -> Self {
        ManifestDescriptor {
            language: language.to_string(),
            version: String::new(),
            origin_path: String::new(),
        }
    }

    /// True when the remote reported no usable bundle for this language
    pub fn is_empty(&self) -> bool {
        self.version.is_empty() || self.origin_path.is_empty()
    }
}

/// Wire shape of the manifest-info endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestInfoResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    version: String,
    #[serde(default)]
    bundle_paths: HashMap<String, String>,
}

/// Queries the remote manifest-info endpoint
pub struct VersionProbe {
    client: Client,
    config: SyncConfig,
}

impl VersionProbe {
    /// Create new probe with configuration
    pub fn new(config: SyncConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(VersionProbe { client, config })
    }

    /// Fetch the descriptor for a language.
    ///
    /// A body-level failure indicator or a missing version/path yields an
    /// empty descriptor. HTTP-level failures surface as transport errors.
    pub async fn fetch_descriptor(&self, language: &str) -> Result<ManifestDescriptor> {
        let url = self.config.manifest_info_url();
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(SyncError::Status(response.status().as_u16()));
        }

        let info: ManifestInfoResponse = response.json().await?;

        if !info.success {
            info!(language = %language, "Remote reported non-success manifest info");
            return Ok(ManifestDescriptor::empty(language));
        }

        let origin_path = info.bundle_paths.get(language).cloned().unwrap_or_default();
        if info.version.is_empty() || origin_path.is_empty() {
            info!(language = %language, "No bundle published for language");
            return Ok(ManifestDescriptor::empty(language));
        }

        info!(
            language = %language,
            version = %info.version,
            origin_path = %origin_path,
            "Origin manifest located"
        );

        Ok(ManifestDescriptor {
            language: language.to_string(),
            version: info.version,
            origin_path,
        })
    }
}

/// Compare the published version against the stored one.
///
/// Returns true when no version is stored, the stored version is empty, or it
/// differs byte-for-byte from the descriptor's.
pub fn is_outdated(descriptor: &ManifestDescriptor, stored_version: Option<&str>) -> bool {
    match stored_version {
        None => true,
        Some(stored) => stored.is_empty() || stored != descriptor.version,
    }
}

/// Build an HTTP client with the configured timeout and API key header
pub(crate) fn build_client(config: &SyncConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(ref key) = config.api_key {
        let value = HeaderValue::from_str(key)
            .map_err(|e| SyncError::Config(format!("Bad API key: {}", e)))?;
        headers.insert("X-API-Key", value);
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent("manifest-mirror/0.1")
        .default_headers(headers)
        .build()?;

    Ok(client)
}

// ============================================================================
// Tests
// ============================================================================
