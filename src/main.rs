//! axon - streaming conversation backend
//!
//! Mediates multi-turn conversations with a streaming model endpoint,
//! decoding its server-sent events into normalized deltas, dispatching
//! requested tool calls, and persisting conversation items.

mod agent;
mod api;
mod db;
mod llm;
mod protocol;
mod tools;

use api::{create_router, AppState};
use db::Database;
use llm::ResponsesClient;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "axon=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("AXON_DB_PATH").unwrap_or_else(|_| "./data/axon.db".to_string());

    let port: u16 = std::env::var("AXON_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let base_url = std::env::var("OPENAI_BASE_URL").ok();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    let api_key_present = !api_key.trim().is_empty();
    if !api_key_present {
        tracing::warn!("OPENAI_API_KEY not set; streaming endpoints will refuse requests");
    }

    let transport = Arc::new(ResponsesClient::new(api_key, base_url));
    let state = AppState::new(db, transport, api_key_present);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state).layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("axon server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
