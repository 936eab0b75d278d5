//! Direct CRUD over the providers, for the web UI.
//!
//! These routes bypass the agent and call the same provider instances the
//! registry dispatches to, so changes are visible to both.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use pico_plugins::{NewNote, NewTodo, Note, NotePatch, Preferences, Todo, TodoPatch};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub message: String,
}

// ── Notes ─────────────────────────────────────────────────────────────────

pub async fn list_notes_handler(State(state): State<AppState>) -> Json<Vec<Note>> {
    Json(state.plugins.notes.list().await)
}

pub async fn get_note_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Note>, ApiError> {
    state
        .plugins
        .notes
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Note not found"))
}

pub async fn create_note_handler(
    State(state): State<AppState>,
    Json(new): Json<NewNote>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let note = state.plugins.notes.create(new).await?;
    info!(id = %note.id, "Note created via API");
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn update_note_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<NotePatch>,
) -> Result<Json<Note>, ApiError> {
    Ok(Json(state.plugins.notes.update(&id, patch).await?))
}

pub async fn delete_note_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state.plugins.notes.delete(&id).await?;
    Ok(Json(DeletedResponse {
        message: "Note deleted".into(),
    }))
}

// ── Todos ─────────────────────────────────────────────────────────────────

pub async fn list_todos_handler(State(state): State<AppState>) -> Json<Vec<Todo>> {
    Json(state.plugins.todos.list().await)
}

pub async fn create_todo_handler(
    State(state): State<AppState>,
    Json(new): Json<NewTodo>,
) -> Result<(StatusCode, Json<Todo>), ApiError> {
    let todo = state.plugins.todos.create(new).await?;
    info!(id = %todo.id, "Todo created via API");
    Ok((StatusCode::CREATED, Json(todo)))
}

/// The body is a partial todo; `"due_date": null` clears the due date.
pub async fn update_todo_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Todo>, ApiError> {
    let patch = TodoPatch::from_json(&body)?;
    Ok(Json(state.plugins.todos.update(&id, patch).await?))
}

pub async fn delete_todo_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state.plugins.todos.delete(&id).await?;
    Ok(Json(DeletedResponse {
        message: "Todo deleted".into(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub todo_ids: Vec<String>,
}

pub async fn reorder_todos_handler(
    State(state): State<AppState>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Vec<Todo>>, ApiError> {
    Ok(Json(state.plugins.todos.reorder(&req.todo_ids).await?))
}

// ── Preferences ───────────────────────────────────────────────────────────

pub async fn get_preferences_handler(State(state): State<AppState>) -> Json<Preferences> {
    Json(state.plugins.preferences.all().await)
}
