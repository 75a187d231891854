//! Axum route handlers for the persona HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`         - Returns `{"status": "ok", "version": .., "service": "zoral"}`
//! - `POST /chat`           - `{"actor", "message"}` → `{"response", "code", "lang"}`
//! - `GET  /history`        - Context window lines (`?limit=N` turns)
//! - `GET  /traits`         - All persona traits
//! - `GET  /traits/:name`   - One trait, with its documented default
//! - `GET  /memories`       - Most recent memories (`?limit=N`)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::chat::engine::PersonaEngine;

/// Default number of memories returned by `/memories`.
const DEFAULT_MEMORY_LIMIT: usize = 20;

/// Shared application state for the HTTP server.
#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: PersonaEngine,
}

impl AppState {
    pub fn new(engine: PersonaEngine) -> Self {
        Self { engine }
    }
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Reply of `POST /chat`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub code: Option<String>,
    pub lang: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/history", get(history_handler))
        .route("/traits", get(list_traits_handler))
        .route("/traits/:name", get(get_trait_handler))
        .route("/memories", get(memories_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health - liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "zoral",
    }))
}

/// POST /chat - run one turn.
///
/// The reply is returned once the chat call finishes. The reflection pass
/// keeps running in the background and only logs its result.
async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Message required"))?;
    let actor = request
        .actor
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Actor required"))?;

    let turn = state.engine.turn(actor, message).await;
    turn.reflection.detach();

    Ok(Json(ChatResponse {
        response: turn.reply.prose,
        code: turn.reply.code,
        lang: turn.reply.language,
    }))
}

/// GET /history - the context window as the next chat prompt would see it.
async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut window = state.engine.window().clone();
    if let Some(limit) = query.limit {
        window.turns = limit;
    }
    let lines = window
        .build(state.engine.state().interactions.as_ref())
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(serde_json::json!({ "lines": lines })))
}

/// GET /traits - every stored trait.
async fn list_traits_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let traits = state
        .engine
        .state()
        .traits
        .list_traits()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(serde_json::json!({ "traits": traits })))
}

/// GET /traits/:name - one trait value, falling back to its default.
async fn get_trait_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let value = state
        .engine
        .state()
        .traits
        .trait_value_or_default(&name)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown trait '{}'", name)))?;
    Ok(Json(serde_json::json!({ "name": name, "value": value })))
}

/// GET /memories - most recent memories, newest first.
async fn memories_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let memories = state
        .engine
        .state()
        .memories
        .list_recent_memories(query.limit.unwrap_or(DEFAULT_MEMORY_LIMIT))
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(serde_json::json!({ "memories": memories })))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
