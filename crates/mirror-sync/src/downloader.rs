// Bundle downloader
//
// Streams the remote bundle archive to disk chunk by chunk. A failed attempt
// leaves a truncated file behind; the next attempt starts over from byte
// zero, so callers must not rely on the previous cycle's file surviving a
// failed download.

use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::probe::{build_client, ManifestDescriptor};
use crate::{Result, SyncError};

/// HTTP client for fetching manifest bundles
pub struct BundleDownloader {
    client: Client,
    config: SyncConfig,
}

impl BundleDownloader {
    /// Create new downloader with configuration
    pub fn new(config: SyncConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(BundleDownloader { client, config })
    }

    /// Download the bundle named by the descriptor to `dest`, retrying from
    /// scratch with exponential backoff on failure.
    ///
    /// Returns the number of bytes written on success.
    pub async fn download(&self, descriptor: &ManifestDescriptor, dest: &Path) -> Result<u64> {
        let url = self.config.bundle_url(&descriptor.origin_path);
        let mut last_error = None;

        for attempt in 1..=self.config.max_retries {
            match self.fetch_to_file(&url, dest).await {
                Ok(written) => {
                    info!(
                        url = %url,
                        dest = %dest.display(),
                        bytes = written,
                        "Bundle download complete"
                    );
                    return Ok(written);
                },
                Err(e) => {
                    warn!(
                        "Download attempt {}/{} failed: {}",
                        attempt, self.config.max_retries, e
                    );
                    last_error = Some(e);

                    if attempt < self.config.max_retries {
                        let backoff_secs = 2u64.pow(attempt);
                        info!("Retrying in {} seconds...", backoff_secs);
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    }
                },
            }
        }

        // max_retries is validated >= 1, so at least one attempt ran
        Err(last_error.unwrap_or_else(|| {
            SyncError::Config("Download failed with no attempts made".to_string())
        }))
    }

    /// Single download attempt: stream the response body to `dest`.
    ///
    /// A non-2xx status aborts before the destination file is touched.
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(SyncError::Status(response.status().as_u16()));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }
}

// ============================================================================
// Tests
// ============================================================================
