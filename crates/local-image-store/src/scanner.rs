//! Storage directory enumeration

use crate::error::Result;
use crate::types::{has_allowed_extension, StoredImage};
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Snapshot the images in `dir`.
///
/// Only regular files directly inside `dir` with an allowlisted extension
/// are returned, in directory order. Entries that vanish between listing
/// and stat (a concurrent delete or eviction) are skipped.
pub async fn scan(dir: &Path, allowed_extensions: &[String]) -> Result<Vec<StoredImage>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut images = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let Ok(filename) = entry.file_name().into_string() else {
            continue;
        };
        if !has_allowed_extension(&filename, allowed_extensions) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(filename = %filename, "Image disappeared during scan");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            continue;
        }

        images.push(StoredImage {
            filename,
            size_bytes: metadata.len(),
            modified_at: DateTime::<Utc>::from(metadata.modified()?),
        });
    }

    Ok(images)
}
