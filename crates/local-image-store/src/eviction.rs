//! Oldest-first eviction

use crate::types::StoredImage;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

/// Pick the images to drop so that at most `limit` remain.
///
/// Candidates are the oldest by modification time, ties broken by filename.
pub fn select_evictions(mut inventory: Vec<StoredImage>, limit: usize) -> Vec<StoredImage> {
    if inventory.len() <= limit {
        return Vec::new();
    }

    inventory.sort_by(|a, b| {
        a.modified_at
            .cmp(&b.modified_at)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    let excess = inventory.len() - limit;
    inventory.truncate(excess);
    inventory
}

/// Remove the oldest images in `dir` until at most `limit` remain.
///
/// A file that cannot be removed is logged and skipped. Returns the
/// filenames actually removed.
pub async fn evict(dir: &Path, inventory: Vec<StoredImage>, limit: usize) -> Vec<String> {
    let mut removed = Vec::new();

    for image in select_evictions(inventory, limit) {
        match fs::remove_file(dir.join(&image.filename)).await {
            Ok(()) => {
                info!(filename = %image.filename, "Removed old image");
                removed.push(image.filename);
            }
            Err(e) => {
                warn!(filename = %image.filename, error = %e, "Failed to remove old image");
            }
        }
    }

    removed
}
