use local_image_store::{AdmissionPolicy, StoreConfig};
use std::env;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub upload_folder: PathBuf,
    pub max_images: usize,
    pub allowed_extensions: Vec<String>,
    /// Request bodies above this size are refused before reaching the store
    pub max_upload_bytes: usize,
    pub admission: AdmissionPolicy,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Missing or unparseable values fall back to their defaults
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let upload_folder = lookup("UPLOAD_FOLDER")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.upload_folder);

        let max_images = lookup("MAX_IMAGES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_images);

        let allowed_extensions = lookup("ALLOWED_EXTENSIONS")
            .map(|s| {
                s.split(',')
                    .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                    .filter(|ext| !ext.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|exts| !exts.is_empty())
            .unwrap_or(defaults.allowed_extensions);

        let max_upload_bytes = lookup("MAX_UPLOAD_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_upload_bytes);

        let admission = lookup("ON_FULL")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.admission);

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
            .unwrap_or(defaults.cors_origins);

        Self {
            port,
            upload_folder,
            max_images,
            allowed_extensions,
            max_upload_bytes,
            admission,
            cors_origins,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            upload_dir: self.upload_folder.clone(),
            max_images: self.max_images,
            allowed_extensions: self.allowed_extensions.clone(),
            admission: self.admission,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let store = StoreConfig::default();
        Self {
            port: DEFAULT_PORT,
            upload_folder: store.upload_dir,
            max_images: store.max_images,
            allowed_extensions: store.allowed_extensions,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            admission: store.admission,
            cors_origins: vec!["*".to_string()],
        }
    }
}
