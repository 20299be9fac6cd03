//! Worker lifecycle admin endpoints.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use cf_domain::worker::{WorkerAssignment, WorkerStatus};

use crate::state::AppState;

use super::{require_worker_token, ApiResult};

/// POST /v1/workers/{meeting_id} — provision a worker (idempotent).
pub async fn start(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<WorkerAssignment>> {
    require_worker_token(&state, &headers)?;
    let assignment = state.workers.start(&meeting_id).await?;
    Ok(Json(assignment))
}

/// DELETE /v1/workers/{worker_id}
pub async fn stop(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    require_worker_token(&state, &headers)?;
    let stopped = state.workers.stop(&worker_id).await?;
    Ok(Json(serde_json::json!({ "stopped": stopped })))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub meeting_id: Option<String>,
}

/// GET /v1/workers?meeting_id=
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<WorkerStatus>>> {
    require_worker_token(&state, &headers)?;
    let workers = state.workers.list(query.meeting_id.as_deref()).await?;
    Ok(Json(workers))
}

/// GET /v1/workers/{worker_id}/status
pub async fn status(
    State(state): State<AppState>,
    Path(worker_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<WorkerStatus>> {
    require_worker_token(&state, &headers)?;
    Ok(Json(state.workers.status(&worker_id).await?))
}

/// POST /v1/workers/cleanup — reap exited workers.
pub async fn cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    require_worker_token(&state, &headers)?;
    let removed = state.workers.cleanup().await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

/// GET /v1/credentials — pool loads per credential index.
pub async fn credentials(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    require_worker_token(&state, &headers)?;
    Ok(Json(serde_json::json!({
        "credentials": state.workers.pool().status(),
    })))
}
