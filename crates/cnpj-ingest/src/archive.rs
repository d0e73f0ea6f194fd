//! Zip extraction
//!
//! Each release archive carries a single table. The payload is the first
//! non-directory entry in central-directory order; every entry is still
//! extracted next to it.

use crate::error::{IngestError, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Name (relative path) of the first non-directory entry of the archive
pub fn first_payload_entry(archive_path: &Path) -> Result<PathBuf> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        return match entry.enclosed_name() {
            Some(name) => Ok(name),
            None => Err(IngestError::UnsafeArchiveEntry(entry.name().to_string())),
        };
    }

    Err(IngestError::EmptyArchive(archive_path.display().to_string()))
}

/// Extract every entry under `dest`, skipping entries whose path would escape it
pub fn extract_all(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %entry.name(), "Skipping archive entry outside the target directory");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        let bytes = io::copy(&mut entry, &mut out)?;
        debug!(file = %out_path.display(), bytes, "Extracted archive entry");
        extracted.push(out_path);
    }

    Ok(extracted)
}

/// Select the payload, extract the archive and return the payload's local path
pub fn extract_payload(archive_path: &Path, dest: &Path) -> Result<PathBuf> {
    let payload = first_payload_entry(archive_path)?;
    extract_all(archive_path, dest)?;
    Ok(dest.join(payload))
}
