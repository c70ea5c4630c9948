//! Store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_MAX_IMAGES: usize = 100;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

/// An image currently on disk, reconstructed from directory metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub filename: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

impl StoredImage {
    /// Path under which the HTTP layer serves this image
    pub fn url(&self) -> String {
        image_url(&self.filename)
    }
}

pub(crate) fn image_url(filename: &str) -> String {
    format!("/image/{}", filename)
}

/// Descriptor returned by a successful save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub filename: String,
    pub url: String,
    pub size_bytes: u64,
}

/// Storage usage, always computed from a full directory scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub count: usize,
    pub total_size_bytes: u64,
    pub max_images: usize,
    pub remaining_slots: usize,
}

impl UsageSummary {
    pub fn from_inventory(inventory: &[StoredImage], max_images: usize) -> Self {
        let count = inventory.len();
        Self {
            count,
            total_size_bytes: inventory.iter().map(|img| img.size_bytes).sum(),
            max_images,
            remaining_slots: max_images.saturating_sub(count),
        }
    }
}

/// Raw image bytes read back from the store
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// Incoming image data as received by an entry point
#[derive(Debug, Clone)]
pub enum ImagePayload {
    /// Raw file bytes (multipart upload)
    Bytes(Vec<u8>),
    /// Bare base64 or a `data:image/...;base64,` URL
    Base64(String),
}

/// What `save` does when the store is already at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Refuse the save with `CapacityExceeded`
    #[default]
    Reject,
    /// Accept the save; post-save eviction removes the oldest image
    EvictOldest,
}

impl std::str::FromStr for AdmissionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(AdmissionPolicy::Reject),
            "evict" | "evict_oldest" => Ok(AdmissionPolicy::EvictOldest),
            other => Err(format!("unknown admission policy: {}", other)),
        }
    }
}

/// Immutable store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub upload_dir: PathBuf,
    pub max_images: usize,
    /// Lowercase extensions without the leading dot
    pub allowed_extensions: Vec<String>,
    pub admission: AdmissionPolicy,
}

impl StoreConfig {
    pub fn new(upload_dir: impl Into<PathBuf>, max_images: usize) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_images,
            ..Self::default()
        }
    }

    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.admission = admission;
        self
    }

    /// Whether `filename` carries an allowlisted extension (case-insensitive)
    pub fn is_allowed(&self, filename: &str) -> bool {
        has_allowed_extension(filename, &self.allowed_extensions)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_images: DEFAULT_MAX_IMAGES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            admission: AdmissionPolicy::Reject,
        }
    }
}

/// Lowercased text after the last dot, if any
pub(crate) fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub(crate) fn has_allowed_extension(filename: &str, allowed: &[String]) -> bool {
    extension_of(filename)
        .map(|ext| allowed.iter().any(|a| *a == ext))
        .unwrap_or(false)
}
