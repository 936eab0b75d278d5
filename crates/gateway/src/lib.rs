//! HTTP API gateway for Pico.
//!
//! Exposes the chat endpoints (JSON and SSE), capability discovery, and
//! plain CRUD routes over the notes, todos and preferences providers.
//!
//! Built on Axum for high performance async HTTP.

pub mod api;
pub mod data;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Router,
    response::Json,
    routing::{get, post, put},
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use pico_agent::Agent;
use pico_config::GatewayConfig;
use pico_plugins::PluginSet;

pub use error::{ApiError, GatewayError};

/// Request bodies above this size are rejected.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub plugins: PluginSet,
}

impl AppState {
    pub fn new(agent: Arc<Agent>, plugins: PluginSet) -> Self {
        Self { agent, plugins }
    }

    /// The model name reported in chat responses.
    pub fn model(&self) -> &str {
        &self.agent.settings().model
    }
}

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - CORS for the configured origins
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(api::chat_handler))
        .route("/api/chat/stream", post(api::chat_stream_handler))
        .route("/api/tools", get(api::list_tools_handler))
        .route("/api/resources", get(api::list_resources_handler))
        .route(
            "/api/notes",
            get(data::list_notes_handler).post(data::create_note_handler),
        )
        .route(
            "/api/notes/{id}",
            get(data::get_note_handler)
                .put(data::update_note_handler)
                .delete(data::delete_note_handler),
        )
        .route(
            "/api/todos",
            get(data::list_todos_handler).post(data::create_todo_handler),
        )
        .route("/api/todos/reorder", post(data::reorder_todos_handler))
        .route(
            "/api/todos/{id}",
            put(data::update_todo_handler).delete(data::delete_todo_handler),
        )
        .route("/api/preferences", get(data::get_preferences_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors_layer(allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Start the gateway HTTP server and run until Ctrl-C.
pub async fn serve(state: AppState, config: &GatewayConfig) -> Result<(), GatewayError> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(state, &config.allowed_origins);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(GatewayError::Serve)?;
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
