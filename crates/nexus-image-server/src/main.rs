//! Nexus image server - local, count-bounded image storage over HTTP
//!
//! Saves uploaded images as normalized PNGs in a local folder, evicts the
//! oldest beyond a configured limit, and serves listing, retrieval and
//! deletion endpoints.

mod config;
mod error;
mod server;
mod types;

use crate::config::Config;
use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState, ENDPOINTS};
use crate::types::bytes_to_mb;
use local_image_store::ImageStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("nexus_image_server=info".parse()?)
        .add_directive("local_image_store=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Nexus image server...");

    let config = Config::from_env();
    info!("Port: {}", config.port);
    info!("Upload folder: {:?}", config.upload_folder);
    info!("Storage limit: {} images", config.max_images);
    info!("Allowed extensions: {}", config.allowed_extensions.join(", "));
    info!("Max upload size: {} MB", config.max_upload_bytes / (1024 * 1024));
    info!("When full: {:?}", config.admission);
    for (route, description) in ENDPOINTS {
        info!("  {:<26} {}", route, description);
    }

    let store = ImageStore::new(config.store_config());
    store.init().await?;

    let usage = store.usage_summary().await?;
    info!(
        "Current storage: {}/{} images ({} MB)",
        usage.count,
        usage.max_images,
        bytes_to_mb(usage.total_size_bytes)
    );

    let state: SharedState = Arc::new(ServerState::new(store));

    // Start HTTP server (blocking)
    start_server(state, &config).await?;

    Ok(())
}
