//! HTTP server for image storage endpoints

use crate::config::Config;
use crate::error::AppError;
use crate::types::{
    CleanupResponse, HealthResponse, HomeResponse, ImageInfo, ListResponse, MessageResponse,
    SaveRequest, SaveResponse, StorageInfo, StorageResponse,
};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use local_image_store::{ImagePayload, ImageStore, StoreConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

const SERVICE_NAME: &str = "Nexus PhotoShop Backend API";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state for the HTTP server
pub struct ServerState {
    pub store: ImageStore,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(store: ImageStore) -> Self {
        Self {
            store,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Route table, used for `GET /` and the startup banner
pub const ENDPOINTS: [(&str, &str); 8] = [
    ("GET /", "API information and storage usage"),
    ("POST /save", "Save an image"),
    ("GET /images", "List all saved images"),
    ("GET /image/<filename>", "Get a specific image"),
    ("DELETE /image/<filename>", "Delete an image"),
    ("GET /storage", "Get storage information"),
    ("POST /cleanup", "Remove the oldest images beyond the limit"),
    ("GET /health", "Health check"),
];

/// Create the HTTP router
pub fn create_router(state: SharedState, config: &Config) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/save", post(save_image))
        .route("/images", get(list_images))
        .route("/image/{filename}", get(get_image).delete(delete_image))
        .route("/storage", get(storage_info))
        .route("/cleanup", post(cleanup))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, config: &Config) -> std::io::Result<()> {
    let router = create_router(state, config);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Service metadata and current usage
async fn home(State(state): State<SharedState>) -> Result<Json<HomeResponse>, AppError> {
    let usage = state.store.usage_summary().await?;

    Ok(Json(HomeResponse {
        message: SERVICE_NAME,
        version: VERSION,
        storage: "Local Storage",
        storage_info: usage.into(),
        endpoints: ENDPOINTS.iter().copied().collect::<BTreeMap<_, _>>(),
    }))
}

/// Save an image sent as JSON base64 or as a multipart file upload
async fn save_image(
    State(state): State<SharedState>,
    request: Request,
) -> Result<(StatusCode, Json<SaveResponse>), AppError> {
    let payload = read_payload(request, state.store.config()).await?;

    let saved = state.store.save(payload).await.map_err(|e| {
        warn!(error = %e, kind = e.kind().as_str(), "Failed to save image");
        e
    })?;

    Ok((
        StatusCode::CREATED,
        Json(SaveResponse {
            success: true,
            filename: saved.filename,
            url: saved.url,
            size: saved.size_bytes,
            message: "Image saved successfully!",
        }),
    ))
}

fn no_image_data() -> AppError {
    AppError::BadRequest(
        "No image data provided. Send as base64 in JSON or as file upload".to_string(),
    )
}

fn content_type_starts_with(headers: &HeaderMap, prefix: &str) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with(prefix))
        .unwrap_or(false)
}

/// Pull the image out of either request shape.
///
/// The uploaded file's own name only gates on extension; the store always
/// assigns a fresh name.
async fn read_payload(request: Request, config: &StoreConfig) -> Result<ImagePayload, AppError> {
    if content_type_starts_with(request.headers(), "multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AppError::rejected(e.status(), e.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::rejected(e.status(), e.body_text()))?
        {
            if field.name() != Some("image") {
                continue;
            }
            let upload_name = field.file_name().unwrap_or_default().to_string();
            if !config.is_allowed(&upload_name) {
                return Err(AppError::BadRequest(format!(
                    "Invalid file type. Allowed types: {}",
                    config.allowed_extensions.join(", ")
                )));
            }
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::rejected(e.status(), e.body_text()))?;
            return Ok(ImagePayload::Bytes(bytes.to_vec()));
        }
        return Err(no_image_data());
    }

    if !content_type_starts_with(request.headers(), "application/json") {
        return Err(no_image_data());
    }

    let Json(body) = Json::<SaveRequest>::from_request(request, &())
        .await
        .map_err(|e| AppError::rejected(e.status(), e.body_text()))?;
    body.image_data
        .map(ImagePayload::Base64)
        .ok_or_else(no_image_data)
}

/// List stored images, newest first
async fn list_images(State(state): State<SharedState>) -> Result<Json<ListResponse>, AppError> {
    let images: Vec<ImageInfo> = state
        .store
        .list()
        .await?
        .into_iter()
        .map(ImageInfo::from)
        .collect();

    Ok(Json(ListResponse {
        success: true,
        count: images.len(),
        images,
    }))
}

/// Serve a stored image's bytes
async fn get_image(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let file = state.store.get(&filename).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, file.content_type)],
        Body::from(file.data),
    )
        .into_response())
}

async fn delete_image(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.store.delete(&filename).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: format!("Image {} deleted successfully", filename),
    }))
}

async fn storage_info(
    State(state): State<SharedState>,
) -> Result<Json<StorageResponse>, AppError> {
    let usage = state.store.usage_summary().await?;

    Ok(Json(StorageResponse {
        success: true,
        storage_info: usage.into(),
    }))
}

/// Force an eviction pass
async fn cleanup(State(state): State<SharedState>) -> Result<Json<CleanupResponse>, AppError> {
    let (removed, usage) = state.store.cleanup().await?;

    Ok(Json(CleanupResponse {
        success: true,
        message: "Cleanup completed",
        removed,
        storage_info: usage.into(),
    }))
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Result<Json<HealthResponse>, AppError> {
    let usage = state.store.usage_summary().await?;
    let now = Utc::now();

    Ok(Json(HealthResponse {
        status: "healthy",
        timestamp: now,
        uptime_secs: uptime_secs(state.started_at, now),
        storage: "local",
        storage_info: StorageInfo::from(usage),
    }))
}

/// Whole seconds since `started_at`, zero if the clock stepped backwards
fn uptime_secs(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - started_at).num_seconds().max(0) as u64
}
