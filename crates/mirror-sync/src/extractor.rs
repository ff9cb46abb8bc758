// Bundle extractor
//
// Unpacks the single embedded database file from a downloaded archive. The
// upstream bundles are single-entry zips; only the first entry is extracted,
// and it is written to the deterministic per-language path regardless of the
// name it carries inside the archive.
//
// A file that is not a valid zip archive is skipped without raising. The
// upstream publisher has shipped already-extracted files before, and the
// legacy behavior tolerated them; callers see `SkippedInvalid` and decide.

use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::ZipArchive;

use crate::{Result, SyncError};

/// Result of an extraction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// First entry extracted; number of bytes written
    Extracted { bytes: u64 },
    /// Input was not a readable zip archive; nothing was written
    SkippedInvalid,
}

/// Extract the first archive entry to `dest`.
///
/// The blocking zip work runs on the blocking thread pool.
pub async fn extract_bundle(archive: &Path, dest: &Path) -> Result<ExtractOutcome> {
    let archive: PathBuf = archive.to_path_buf();
    let dest: PathBuf = dest.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest)).await?
}

fn extract_blocking(archive_path: &Path, dest: &Path) -> Result<ExtractOutcome> {
    let file = File::open(archive_path)?;

    let mut archive = match ZipArchive::new(file) {
        Ok(archive) if archive.len() > 0 => archive,
        Ok(_) => {
            warn!(path = %archive_path.display(), "Archive has no entries, skipping extraction");
            return Ok(ExtractOutcome::SkippedInvalid);
        },
        Err(e) => {
            warn!(
                path = %archive_path.display(),
                error = %e,
                "Not a valid archive, skipping extraction"
            );
            return Ok(ExtractOutcome::SkippedInvalid);
        },
    };

    let mut entry = archive
        .by_index(0)
        .map_err(|e| SyncError::Archive(e.to_string()))?;

    let mut out = File::create(dest)?;
    let bytes = std::io::copy(&mut entry, &mut out)?;

    info!(
        entry = %entry.name(),
        dest = %dest.display(),
        bytes,
        "Extracted embedded database"
    );

    Ok(ExtractOutcome::Extracted { bytes })
}

// ============================================================================
// Tests
// ============================================================================
