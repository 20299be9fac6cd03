//! Route table.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::signaling::ws;
use crate::state::AppState;

use super::transcripts::MAX_UPLOAD_BYTES;
use super::{agent, rooms, transcripts, workers};

pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.server.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        // Meeting room
        .route("/v1/meetings/:id/room", get(rooms::room))
        .route("/v1/meetings/:id/start", post(rooms::start))
        .route("/v1/meetings/:id/end", post(rooms::end))
        .route("/v1/meetings/:id/complete", post(rooms::complete))
        // Signaling
        .route("/v1/meetings/:id/ws", get(ws::meeting_ws))
        // Transcripts & context
        .route(
            "/v1/meetings/:id/transcript-segments",
            post(transcripts::append_segment),
        )
        .route(
            "/v1/meetings/:id/agent-context",
            post(transcripts::update_agent_context),
        )
        // Agent
        .route("/v1/meetings/:id/agent-stream", get(agent::voice_stream))
        .route("/v1/agent/spotlight", post(agent::spotlight))
        .route("/v1/agent/hitl", get(agent::hitl_pending))
        .route("/v1/agent/hitl/:request_id", post(agent::hitl_resume))
        // Workers & credentials
        .route("/v1/workers", get(workers::list))
        .route("/v1/workers/cleanup", post(workers::cleanup))
        .route("/v1/workers/:meeting_id", post(workers::start))
        .route("/v1/workers/:worker_id", delete(workers::stop))
        .route("/v1/workers/:worker_id/status", get(workers::status))
        .route("/v1/credentials", get(workers::credentials))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
