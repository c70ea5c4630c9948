//! Error types for the image server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use local_image_store::StoreError;
use serde_json::json;
use std::fmt;

/// Startup and serving failures
#[derive(Debug)]
pub enum ServerError {
    Store(StoreError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Store(err) => write!(f, "Store error: {}", err),
            ServerError::Io(err) => write!(f, "IO error: {}", err),
            ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Store(err) => Some(err),
            ServerError::Io(err) => Some(err.as_ref()),
            ServerError::Config(_) => None,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        ServerError::Store(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Per-request error that converts to a JSON HTTP response
#[derive(Debug)]
pub enum AppError {
    Store(StoreError),
    BadRequest(String),
    PayloadTooLarge(String),
}

impl AppError {
    /// Map an extractor rejection, keeping the 413 from the body limit
    pub fn rejected(status: StatusCode, detail: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(detail)
        } else {
            AppError::BadRequest(detail)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, kind) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BadRequest"),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, msg, "PayloadTooLarge")
            }
            AppError::Store(err) => {
                let kind = err.kind().as_str();
                match err {
                    StoreError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string(), kind),
                    err if err.is_client_error() => {
                        (StatusCode::BAD_REQUEST, err.to_string(), kind)
                    }
                    err => {
                        tracing::error!(error = %err, kind, "Internal server error");
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Internal server error".to_string(),
                            kind,
                        )
                    }
                }
            }
        };

        (
            status,
            axum::Json(json!({ "success": false, "error": message, "kind": kind })),
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}
