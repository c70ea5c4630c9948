//! Count-bounded local image store
//!
//! Persists normalized PNG images to a flat directory, enforces a maximum
//! image count with oldest-first eviction, and reports usage from a fresh
//! scan of the directory. The directory listing is the only state; there is
//! no index or sidecar metadata.

mod codec;
mod error;
mod eviction;
mod filename;
mod scanner;
mod store;
mod types;

pub use codec::{decode_and_normalize, decode_payload};
pub use error::{ErrorKind, Result, StoreError};
pub use eviction::{evict, select_evictions};
pub use filename::{generate_filename, is_safe_filename};
pub use scanner::scan;
pub use store::ImageStore;
pub use types::{
    AdmissionPolicy, ImagePayload, SaveResult, StoreConfig, StoredFile, StoredImage, UsageSummary,
};

#[cfg(test)]
mod test_support;
