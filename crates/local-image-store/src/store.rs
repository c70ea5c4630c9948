//! Store operations: save, get, delete, usage and cleanup

use crate::codec::{accepted_formats, decode_and_normalize};
use crate::error::{Result, StoreError};
use crate::eviction::evict;
use crate::filename::{generate_filename, is_safe_filename};
use crate::scanner::scan;
use crate::types::{
    extension_of, image_url, AdmissionPolicy, ImagePayload, SaveResult, StoreConfig, StoredFile,
    StoredImage, UsageSummary,
};
use image::ImageFormat;
use std::io;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;
use tracing::{debug, info, warn};

const STORED_EXTENSION: &str = "png";

/// Count-bounded image store over a single flat directory.
///
/// Holds no locks and no cached counters; every operation works from the
/// directory as it is at call time. Two concurrent saves can both pass the
/// capacity check, leaving the store one over its bound until the next
/// eviction pass.
pub struct ImageStore {
    config: StoreConfig,
    accepted: Vec<ImageFormat>,
}

impl ImageStore {
    /// Saved images are always PNG, so `png` is added to the set of
    /// extensions that are scanned, served and evicted even when the
    /// configured allowlist leaves it out. Decoding still only accepts the
    /// configured formats.
    pub fn new(mut config: StoreConfig) -> Self {
        let accepted = accepted_formats(&config.allowed_extensions);
        if !config.allowed_extensions.iter().any(|ext| ext == STORED_EXTENSION) {
            warn!("Allowlist omits png; stored images are still tracked as png");
            config.allowed_extensions.push(STORED_EXTENSION.to_string());
        }
        Self { config, accepted }
    }

    /// Ensure the storage directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.config.upload_dir).await?;
        info!(upload_dir = ?self.config.upload_dir, "Image store initialized");
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Decode, normalize and persist an image under a generated name
    pub async fn save(&self, payload: ImagePayload) -> Result<SaveResult> {
        self.save_as(payload, generate_filename()).await
    }

    /// Like [`save`](Self::save), but with a caller-chosen `.png` filename
    pub async fn save_with_name(&self, payload: ImagePayload, filename: &str) -> Result<SaveResult> {
        if !is_safe_filename(filename) || extension_of(filename).as_deref() != Some(STORED_EXTENSION) {
            return Err(StoreError::InvalidFilename(filename.to_string()));
        }
        // Fail fast before decoding; the link in `write_atomically` is what
        // actually keeps stored images write-once.
        if fs::try_exists(self.path_for(filename)).await? {
            return Err(StoreError::InvalidFilename(filename.to_string()));
        }
        self.save_as(payload, filename.to_string()).await
    }

    async fn save_as(&self, payload: ImagePayload, filename: String) -> Result<SaveResult> {
        if self.config.admission == AdmissionPolicy::Reject {
            let count = self.inventory().await?.len();
            if count >= self.config.max_images {
                info!(count, max_images = self.config.max_images, "Rejecting save, store is full");
                return Err(StoreError::CapacityExceeded {
                    max_images: self.config.max_images,
                });
            }
        }

        let accepted = self.accepted.clone();
        let png = tokio::task::spawn_blocking(move || decode_and_normalize(payload, &accepted))
            .await??;

        let path = self.path_for(&filename);
        self.write_atomically(&filename, &png).await?;
        debug!(filename = %filename, size = png.len(), "Wrote image");

        let removed = self.evict().await;
        if !removed.is_empty() {
            debug!(count = removed.len(), "Evicted images after save");
        }

        let size_bytes = if removed.contains(&filename) {
            warn!(filename = %filename, "Saved image was evicted immediately");
            png.len() as u64
        } else {
            match fs::metadata(&path).await {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    debug!(filename = %filename, error = %e, "Saved image vanished before stat");
                    png.len() as u64
                }
            }
        };

        info!(filename = %filename, size_bytes, "Image saved");
        Ok(SaveResult {
            url: image_url(&filename),
            filename,
            size_bytes,
        })
    }

    /// Write to a hidden temporary file, then link it into place.
    ///
    /// Linking fails if the target already exists, so an existing image is
    /// never replaced, even by a concurrent save of the same name.
    async fn write_atomically(&self, filename: &str, data: &[u8]) -> Result<()> {
        let id = Uuid::new_v4().simple().to_string();
        let tmp = self.path_for(&format!(".{}.{}.tmp", filename, &id[..8]));
        let result = match fs::write(&tmp, data).await {
            Ok(()) => fs::hard_link(&tmp, self.path_for(filename)).await,
            Err(e) => Err(e),
        };
        let _ = fs::remove_file(&tmp).await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(StoreError::InvalidFilename(filename.to_string()))
            }
            Err(e) => Err(StoreError::WriteFailed(Box::new(e))),
        }
    }

    /// Read back a stored image
    pub async fn get(&self, filename: &str) -> Result<StoredFile> {
        let path = self.checked_path(filename)?;

        match fs::read(&path).await {
            Ok(data) => Ok(StoredFile {
                filename: filename.to_string(),
                content_type: content_type_for(filename),
                data,
            }),
            Err(e) => Err(not_found_or_io(e, filename)),
        }
    }

    /// Remove a stored image
    pub async fn delete(&self, filename: &str) -> Result<()> {
        let path = self.checked_path(filename)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!(filename = %filename, "Image deleted");
                Ok(())
            }
            Err(e) => Err(not_found_or_io(e, filename)),
        }
    }

    /// All stored images, newest first
    pub async fn list(&self) -> Result<Vec<StoredImage>> {
        let mut images = self.inventory().await?;
        images.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(images)
    }

    /// Usage from a fresh scan
    pub async fn usage_summary(&self) -> Result<UsageSummary> {
        let inventory = self.inventory().await?;
        Ok(UsageSummary::from_inventory(&inventory, self.config.max_images))
    }

    /// Run one eviction pass against the current inventory.
    ///
    /// Failures, including a failed scan, are logged and yield an empty list.
    pub async fn evict(&self) -> Vec<String> {
        match self.inventory().await {
            Ok(inventory) => evict(&self.config.upload_dir, inventory, self.config.max_images).await,
            Err(e) => {
                warn!(error = %e, "Eviction skipped, could not scan storage directory");
                Vec::new()
            }
        }
    }

    /// Evict down to the bound and report the resulting usage
    pub async fn cleanup(&self) -> Result<(Vec<String>, UsageSummary)> {
        let removed = self.evict().await;
        info!(removed = removed.len(), "Cleanup completed");
        Ok((removed, self.usage_summary().await?))
    }

    async fn inventory(&self) -> Result<Vec<StoredImage>> {
        scan(&self.config.upload_dir, &self.config.allowed_extensions).await
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.config.upload_dir.join(filename)
    }

    /// Validate a caller-supplied name before it reaches the filesystem
    fn checked_path(&self, filename: &str) -> Result<PathBuf> {
        if !is_safe_filename(filename) {
            warn!(filename = %filename, "Rejected unsafe filename");
            return Err(StoreError::InvalidFilename(filename.to_string()));
        }
        if !self.config.is_allowed(filename) {
            return Err(StoreError::NotFound(filename.to_string()));
        }
        Ok(self.path_for(filename))
    }
}

fn not_found_or_io(err: io::Error, filename: &str) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(filename.to_string()),
        _ => StoreError::Io(Box::new(err)),
    }
}

fn content_type_for(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{encode, opaque_rgb, png_base64, set_mtime, to_base64, write_aged};
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::collections::HashSet;
    use std::path::Path;
    use tempfile::tempdir;

    async fn store_in(dir: &Path, max_images: usize, admission: AdmissionPolicy) -> ImageStore {
        let store = ImageStore::new(StoreConfig::new(dir, max_images).with_admission(admission));
        store.init().await.unwrap();
        store
    }

    fn dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_init_creates_directory() {
        let dir = tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");
        let store = ImageStore::new(StoreConfig::new(&upload_dir, 10));

        store.init().await.unwrap();
        assert!(upload_dir.is_dir());
    }

    #[tokio::test]
    async fn test_save_then_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;
        let source = opaque_rgb(7, 5);

        let saved = store
            .save(ImagePayload::Base64(to_base64(&encode(
                &source,
                image::ImageFormat::Png,
            ))))
            .await
            .unwrap();

        assert!(saved.filename.starts_with("nexus_edit_"));
        assert!(saved.filename.ends_with(".png"));
        assert_eq!(saved.url, format!("/image/{}", saved.filename));
        let on_disk = std::fs::metadata(dir.path().join(&saved.filename)).unwrap();
        assert_eq!(saved.size_bytes, on_disk.len());

        let file = store.get(&saved.filename).await.unwrap();
        assert_eq!(file.content_type, "image/png");
        let decoded = image::load_from_memory(&file.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (7, 5));
        assert_eq!(decoded.to_rgb8(), source.to_rgb8());
    }

    #[tokio::test]
    async fn test_save_flattens_transparency() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 0])));

        let saved = store
            .save(ImagePayload::Bytes(encode(&rgba, image::ImageFormat::Png)))
            .await
            .unwrap();

        let file = store.get(&saved.filename).await.unwrap();
        let decoded = image::load_from_memory(&file.data).unwrap();
        assert!(!decoded.color().has_alpha());
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[tokio::test]
    async fn test_capacity_exceeded_before_decode() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 2, AdmissionPolicy::Reject).await;

        store.save(ImagePayload::Base64(png_base64(2, 2))).await.unwrap();
        store.save(ImagePayload::Base64(png_base64(2, 2))).await.unwrap();

        // Garbage payload proves the capacity check runs first
        let err = store
            .save(ImagePayload::Base64("%%%".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(store.usage_summary().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_evict_oldest_scenario() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 2, AdmissionPolicy::EvictOldest).await;

        let a = store.save(ImagePayload::Base64(png_base64(2, 2))).await.unwrap();
        set_mtime(&dir.path().join(&a.filename), 300);
        let b = store.save(ImagePayload::Base64(png_base64(3, 3))).await.unwrap();
        set_mtime(&dir.path().join(&b.filename), 200);
        let c = store.save(ImagePayload::Base64(png_base64(4, 4))).await.unwrap();

        let listed: HashSet<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.filename)
            .collect();
        let expected: HashSet<String> = [b.filename, c.filename].into_iter().collect();

        assert_eq!(listed, expected);
        assert!(!dir.path().join(&a.filename).exists());
    }

    #[tokio::test]
    async fn test_capacity_invariant_holds_after_every_save() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 3, AdmissionPolicy::EvictOldest).await;

        for i in 0..8 {
            store
                .save(ImagePayload::Base64(png_base64(1 + i, 1)))
                .await
                .unwrap();
            assert!(store.list().await.unwrap().len() <= 3);
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_oldest_first() {
        let dir = tempdir().unwrap();
        write_aged(dir.path(), "c.png", b"c", 30);
        write_aged(dir.path(), "e.png", b"e", 10);
        write_aged(dir.path(), "a.png", b"a", 50);
        write_aged(dir.path(), "d.png", b"d", 20);
        write_aged(dir.path(), "b.png", b"b", 40);
        let store = store_in(dir.path(), 2, AdmissionPolicy::Reject).await;

        let (removed, usage) = store.cleanup().await.unwrap();

        assert_eq!(removed, vec!["a.png", "b.png", "c.png"]);
        assert_eq!(usage.count, 2);
        let remaining: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.filename)
            .collect();
        assert_eq!(remaining, vec!["e.png", "d.png"]);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let dir = tempdir().unwrap();
        for (i, name) in ["a.png", "b.png", "c.png"].iter().enumerate() {
            write_aged(dir.path(), name, b"xyz", 100 - i as u64);
        }
        let store = store_in(dir.path(), 2, AdmissionPolicy::Reject).await;

        let (first_removed, first) = store.cleanup().await.unwrap();
        let (second_removed, second) = store.cleanup().await.unwrap();

        assert_eq!(first_removed.len(), 1);
        assert!(second_removed.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;

        for name in ["../etc/passwd", "/etc/passwd", "..", "sub/../x.png"] {
            let err = store.get(name).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFilename, "get {}", name);
            let err = store.delete(name).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFilename, "delete {}", name);
        }
    }

    #[tokio::test]
    async fn test_get_and_delete_missing() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;

        assert_eq!(
            store.get("missing.png").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store.delete("missing.png").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_non_image_files_are_invisible() {
        let dir = tempdir().unwrap();
        write_aged(dir.path(), "notes.txt", b"hello", 1);
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;

        assert_eq!(
            store.get("notes.txt").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store.delete("notes.txt").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(store.usage_summary().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;
        let saved = store.save(ImagePayload::Base64(png_base64(2, 2))).await.unwrap();

        store.delete(&saved.filename).await.unwrap();

        assert!(!dir.path().join(&saved.filename).exists());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_base64_leaves_store_untouched() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;
        let before = store.usage_summary().await.unwrap();

        let err = store
            .save(ImagePayload::Base64("data:image/png;base64,@@not-base64@@".to_string()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidEncoding);
        assert_eq!(store.usage_summary().await.unwrap(), before);
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_usage_summary_counts_sizes() {
        let dir = tempdir().unwrap();
        write_aged(dir.path(), "a.png", &[0u8; 100], 2);
        write_aged(dir.path(), "b.gif", &[0u8; 50], 1);
        let store = store_in(dir.path(), 5, AdmissionPolicy::Reject).await;

        let usage = store.usage_summary().await.unwrap();
        assert_eq!(
            usage,
            UsageSummary {
                count: 2,
                total_size_bytes: 150,
                max_images: 5,
                remaining_slots: 3,
            }
        );
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let dir = tempdir().unwrap();
        write_aged(dir.path(), "old.png", b"o", 100);
        write_aged(dir.path(), "new.png", b"n", 1);
        write_aged(dir.path(), "mid.png", b"m", 50);
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.filename)
            .collect();
        assert_eq!(names, vec!["new.png", "mid.png", "old.png"]);
    }

    #[tokio::test]
    async fn test_save_with_name() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;

        let saved = store
            .save_with_name(ImagePayload::Base64(png_base64(2, 2)), "custom.png")
            .await
            .unwrap();
        assert_eq!(saved.filename, "custom.png");
        assert_eq!(saved.url, "/image/custom.png");

        for bad in ["../custom.png", "custom.jpg", "custom.png"] {
            let err = store
                .save_with_name(ImagePayload::Base64(png_base64(2, 2)), bad)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFilename, "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_allowlist_without_png_still_tracks_saved_images() {
        let dir = tempdir().unwrap();
        let mut config = StoreConfig::new(dir.path(), 2);
        config.allowed_extensions = vec!["jpg".to_string(), "jpeg".to_string()];
        let store = ImageStore::new(config);
        store.init().await.unwrap();
        let jpeg = || ImagePayload::Bytes(encode(&opaque_rgb(4, 4), image::ImageFormat::Jpeg));

        // png stays tracked but is not an accepted input format
        let err = store
            .save(ImagePayload::Base64(png_base64(2, 2)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);

        for _ in 0..2 {
            let saved = store.save(jpeg()).await.unwrap();
            assert_eq!(store.get(&saved.filename).await.unwrap().content_type, "image/png");
        }
        assert_eq!(store.usage_summary().await.unwrap().count, 2);

        let err = store.save(jpeg()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    }

    #[tokio::test]
    async fn test_allowlist_without_png_evicts() {
        let dir = tempdir().unwrap();
        let mut config =
            StoreConfig::new(dir.path(), 2).with_admission(AdmissionPolicy::EvictOldest);
        config.allowed_extensions = vec!["jpg".to_string()];
        let store = ImageStore::new(config);
        store.init().await.unwrap();

        for _ in 0..5 {
            store
                .save(ImagePayload::Bytes(encode(&opaque_rgb(3, 3), image::ImageFormat::Jpeg)))
                .await
                .unwrap();
        }

        assert_eq!(dir_entries(dir.path()), 2);
        assert_eq!(store.usage_summary().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_concurrent_saves_with_same_name() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 10, AdmissionPolicy::Reject).await;

        let (first, second) = tokio::join!(
            store.save_with_name(ImagePayload::Base64(png_base64(2, 2)), "shared.png"),
            store.save_with_name(ImagePayload::Base64(png_base64(3, 3)), "shared.png"),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(|r| r.err()).unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidFilename);
        // Only the winning image, no leftover temp files
        assert_eq!(dir_entries(dir.path()), 1);
        let file = store.get("shared.png").await.unwrap();
        assert!(image::load_from_memory(&file.data).is_ok());
    }

    #[tokio::test]
    async fn test_save_into_zero_capacity_is_evicted() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), 0, AdmissionPolicy::EvictOldest).await;

        let saved = store.save(ImagePayload::Base64(png_base64(2, 2))).await.unwrap();

        assert!(saved.size_bytes > 0);
        assert!(!dir.path().join(&saved.filename).exists());
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.gif"), "image/gif");
        assert_eq!(content_type_for("a.bmp"), "image/bmp");
        assert_eq!(content_type_for("a"), "application/octet-stream");
    }
}
