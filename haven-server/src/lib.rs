//! Haven Server - a small supportive chatbot served over HTTP.
//!
//! This crate provides:
//! - Bounded per-session conversation history
//! - Prompt assembly and reply extraction for plain causal language models
//! - Pluggable HTTP text-generation backends (Ollama, OpenAI-compatible completions)
//! - The `/api` routes and the static chat UI
//!
//! ## Architecture
//!
//! ```text
//! Browser → /api/chat → ChatService (history → prompt → generator → reply)
//!                            ↓
//!                     SessionStore (last N exchanges)
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod chat;
pub mod generator;
pub mod prompt;
pub mod routes;
pub mod session;

pub use chat::{ChatReply, ChatService};
pub use generator::{
    create_generator, load_generator, CompletionsGenerator, GenerationError, GenerationParams,
    OllamaGenerator, TextGenerator,
};
pub use routes::{api_routes, AppState};
pub use session::{Exchange, SessionStore};

use axum::{middleware, Router};
use haven_common::config::Config;
use haven_common::logging::trace_requests;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

/// Build the router with API routes, static assets and middleware.
pub fn build_router(config: &Config, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = api_routes(state);

    let static_dir = config.static_dir();
    if static_dir.is_dir() {
        tracing::debug!(path = %static_dir.display(), "Serving static assets");
        router = router.fallback_service(ServeDir::new(static_dir));
    } else {
        tracing::warn!(path = %static_dir.display(), "Static directory not found, UI disabled");
    }

    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(trace_requests))
            .layer(cors)
            .map_response(|res: axum::response::Response<_>| res.map(axum::body::Body::new))
            .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes)),
    )
}

/// Start the server: load the model, bind, and serve until Ctrl-C.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;

    let generator = load_generator(&config.model).await;
    let state = AppState::from_config(config, generator);
    let model_loaded = state.model_loaded();
    let router = build_router(config, state);

    tracing::info!(%addr, model_loaded, "Starting Haven server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
