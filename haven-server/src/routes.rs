//! HTTP API for Haven.
//!
//! - `POST /api/chat`  → streamed plain-text reply
//! - `POST /api/clear` → empty a session's history
//! - `GET  /api/health` → liveness plus model status

use crate::chat::ChatService;
use crate::generator::TextGenerator;
use crate::session::SessionStore;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Extension, State},
    http::header,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::stream;
use haven_common::config::Config;
use haven_common::logging::RequestContext;
use haven_common::{request_span, Error, Result};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

const MODEL_NOT_LOADED: &str = "Model not loaded. Please restart the server.";
const EMPTY_MESSAGE: &str = "Message cannot be empty";
const PROCESSING_FAILED: &str =
    "An error occurred while processing your message. Please try again.";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    /// `None` when the model failed to load at startup
    pub chat: Option<Arc<ChatService>>,
    pub default_session_id: String,
}

impl AppState {
    /// Wire the session store and (optional) generator according to `config`.
    pub fn from_config(config: &Config, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        let sessions = Arc::new(SessionStore::new(config.chat.history_limit));
        let timeout = config.model.timeout_secs.map(Duration::from_secs);

        let chat = generator.map(|generator| {
            Arc::new(
                ChatService::new(
                    Arc::clone(&sessions),
                    generator,
                    config.chat.system_instruction.clone(),
                )
                .with_timeout(timeout),
            )
        });

        Self {
            sessions,
            chat,
            default_session_id: config.chat.default_session_id.clone(),
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.chat.is_some()
    }

    fn session_id(&self, requested: Option<String>) -> String {
        requested.unwrap_or_else(|| self.default_session_id.clone())
    }
}

/// Chat request body.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Clear request body.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Clear response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub message: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// Build the `/api` routes.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/clear", post(clear_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<AppState>,
    ctx: Option<Extension<RequestContext>>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let Some(chat) = state.chat.clone() else {
        return Err(Error::ModelUnavailable(MODEL_NOT_LOADED.into()));
    };

    let Json(request) = payload.map_err(|e| {
        tracing::error!(error = %e.body_text(), "Unreadable chat request");
        Error::Internal(PROCESSING_FAILED.into())
    })?;

    let message = request.message.as_deref().unwrap_or_default().trim().to_string();
    if message.is_empty() {
        return Err(Error::InvalidInput(EMPTY_MESSAGE.into()));
    }
    let session_id = state.session_id(request.session_id);

    let trace_id = ctx
        .map(|Extension(ctx)| ctx.trace_id)
        .unwrap_or_default();
    let span = request_span!("chat_turn", trace_id, session_id = %session_id);

    let turn = tokio::spawn(
        async move { chat.respond(&session_id, &message).await }.instrument(span),
    );
    let reply = turn.await.map_err(|e| {
        tracing::error!(error = %e, "Chat turn aborted");
        Error::Internal(PROCESSING_FAILED.into())
    })?;

    let chunks = stream::iter(reply.chunks.into_iter().map(Ok::<_, Infallible>));
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(chunks),
    )
        .into_response())
}

async fn clear_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ClearRequest>, JsonRejection>,
) -> Result<Json<ClearResponse>> {
    let Json(request) = payload.map_err(|e| {
        tracing::error!(error = %e.body_text(), "Unreadable clear request");
        Error::Internal(e.body_text())
    })?;
    let session_id = state.session_id(request.session_id);

    state.sessions.clear(&session_id);
    tracing::debug!(session_id = %session_id, "Conversation cleared");

    Ok(Json(ClearResponse {
        message: "Conversation cleared".into(),
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        model_loaded: state.model_loaded(),
    })
}
