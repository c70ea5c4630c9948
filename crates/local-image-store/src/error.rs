//! Error types for the local image store

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// Payload was not valid base64
    InvalidEncoding(String),
    /// Decoded bytes are not an accepted raster image
    UnsupportedFormat(String),
    /// Store already holds the maximum number of images
    CapacityExceeded { max_images: usize },
    /// Filename failed the path safety check
    InvalidFilename(String),
    NotFound(String),
    /// Persisting a normalized image failed
    WriteFailed(Box<std::io::Error>),
    Io(Box<std::io::Error>),
    Unexpected(String),
}

/// Stable, serializable name of a [`StoreError`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidEncoding,
    UnsupportedFormat,
    CapacityExceeded,
    InvalidFilename,
    NotFound,
    WriteFailed,
    IoFailure,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidEncoding => "InvalidEncoding",
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::CapacityExceeded => "CapacityExceeded",
            ErrorKind::InvalidFilename => "InvalidFilename",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::WriteFailed => "WriteFailed",
            ErrorKind::IoFailure => "IOFailure",
            ErrorKind::Unexpected => "Unexpected",
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidEncoding(_) => ErrorKind::InvalidEncoding,
            StoreError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            StoreError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            StoreError::InvalidFilename(_) => ErrorKind::InvalidFilename,
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::WriteFailed(_) => ErrorKind::WriteFailed,
            StoreError::Io(_) => ErrorKind::IoFailure,
            StoreError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// True when the failure was caused by the caller's input rather than
    /// the environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidEncoding
                | ErrorKind::UnsupportedFormat
                | ErrorKind::CapacityExceeded
                | ErrorKind::InvalidFilename
                | ErrorKind::NotFound
        )
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidEncoding(msg) => write!(f, "Invalid base64 encoding: {}", msg),
            StoreError::UnsupportedFormat(msg) => write!(f, "Unsupported image format: {}", msg),
            StoreError::CapacityExceeded { max_images } => write!(
                f,
                "Storage limit reached. Maximum {} images allowed.",
                max_images
            ),
            StoreError::InvalidFilename(_) => write!(f, "Invalid filename"),
            StoreError::NotFound(_) => write!(f, "Image not found"),
            StoreError::WriteFailed(err) => write!(f, "Failed to write image: {}", err),
            StoreError::Io(err) => write!(f, "IO error: {}", err),
            StoreError::Unexpected(msg) => write!(f, "Unexpected error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::WriteFailed(err) | StoreError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(Box::new(err))
    }
}

impl From<base64::DecodeError> for StoreError {
    fn from(err: base64::DecodeError) -> Self {
        StoreError::InvalidEncoding(err.to_string())
    }
}

// Decoding always reads from memory, so an image I/O error means a
// truncated or corrupt payload.
impl From<image::ImageError> for StoreError {
    fn from(err: image::ImageError) -> Self {
        StoreError::UnsupportedFormat(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Unexpected(format!("image task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
