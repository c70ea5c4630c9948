//! JSON bodies for the image server

use chrono::{DateTime, Utc};
use local_image_store::{StoredImage, UsageSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `POST /save` when sent as JSON
#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(rename = "imageData")]
    pub image_data: Option<String>,
}

/// Storage usage as exposed over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub total_images: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub max_images: usize,
    pub remaining_slots: usize,
}

impl From<UsageSummary> for StorageInfo {
    fn from(usage: UsageSummary) -> Self {
        Self {
            total_images: usage.count,
            total_size_bytes: usage.total_size_bytes,
            total_size_mb: bytes_to_mb(usage.total_size_bytes),
            max_images: usage.max_images,
            remaining_slots: usage.remaining_slots,
        }
    }
}

/// Megabytes rounded to two decimals
pub fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

#[derive(Debug, Serialize)]
pub struct ImageInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub modified: DateTime<Utc>,
    pub url: String,
}

impl From<StoredImage> for ImageInfo {
    fn from(image: StoredImage) -> Self {
        Self {
            url: image.url(),
            size_mb: bytes_to_mb(image.size_bytes),
            size_bytes: image.size_bytes,
            modified: image.modified_at,
            filename: image.filename,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub message: &'static str,
    pub version: &'static str,
    pub storage: &'static str,
    pub storage_info: StorageInfo,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    pub filename: String,
    pub url: String,
    pub size: u64,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub images: Vec<ImageInfo>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StorageResponse {
    pub success: bool,
    pub storage_info: StorageInfo,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: &'static str,
    pub removed: Vec<String>,
    pub storage_info: StorageInfo,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub storage: &'static str,
    pub uptime_secs: u64,
    pub storage_info: StorageInfo,
}
