//! Chat and discovery endpoints.
//!
//! - `POST /api/chat`         : run the agent, get the answer as JSON
//! - `POST /api/chat/stream`  : run the agent, get an SSE stream of events
//! - `GET  /api/tools`        : tools discovered from every provider
//! - `GET  /api/resources`    : resources discovered from every provider

use std::convert::Infallible;

use axum::{
    extract::State,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use pico_agent::{ActionMetadata, ProfilingSummary, RunOptions};
use pico_core::message::{Message, Role};
use pico_core::registry::DiscoveredResource;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Inject notes, todos and preferences into the system prompt
    #[serde(default, alias = "include_notes")]
    pub include_context: Option<bool>,
}

impl ChatRequest {
    /// Client history as agent messages. Client-sent tool turns carry no
    /// call ids and are skipped.
    fn history(self) -> Result<Vec<Message>, ApiError> {
        if self.messages.is_empty() {
            return Err(ApiError::bad_request("messages must not be empty"));
        }
        Ok(self
            .messages
            .into_iter()
            .filter_map(|m| match m.role {
                Role::User => Some(Message::user(m.content)),
                Role::Assistant => Some(Message::assistant(m.content)),
                Role::System => Some(Message::system(m.content)),
                Role::Tool => None,
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
    pub metadata: ActionMetadata,
    pub profiling: ProfilingSummary,
}

/// `POST /api/chat`
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let options = RunOptions {
        include_context: payload.include_context,
        ..RunOptions::default()
    };
    let history = payload.history()?;
    info!(messages = history.len(), "Chat request");

    let outcome = state
        .agent
        .run_with_options(history, options)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(ChatResponse {
        response: outcome.response,
        model: state.model().to_string(),
        metadata: outcome.metadata,
        profiling: outcome.profiling,
    }))
}

/// `POST /api/chat/stream`: the run's events as SSE, named by event type.
///
/// Closing the connection drops the receiver, which cancels the run.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let options = RunOptions {
        include_context: payload.include_context,
        ..RunOptions::default()
    };
    let history = payload.history()?;
    info!(messages = history.len(), "Chat stream request");

    let rx = state.agent.run_stream(history, options);
    let stream = ReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event_type).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub provider: String,
    pub input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolInfo>,
    pub count: usize,
}

/// `GET /api/tools`
pub async fn list_tools_handler(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolInfo> = state
        .agent
        .registry()
        .discover_tools()
        .into_iter()
        .map(|t| ToolInfo {
            input_schema: t.descriptor.input_schema(),
            name: t.descriptor.name,
            description: t.descriptor.description,
            provider: t.provider,
        })
        .collect();
    let count = tools.len();
    Json(ToolListResponse { tools, count })
}

#[derive(Debug, Serialize)]
pub struct ResourceListResponse {
    pub resources: Vec<DiscoveredResource>,
    pub count: usize,
}

/// `GET /api/resources`
pub async fn list_resources_handler(State(state): State<AppState>) -> Json<ResourceListResponse> {
    let resources = state.agent.registry().discover_resources();
    let count = resources.len();
    Json(ResourceListResponse { resources, count })
}
