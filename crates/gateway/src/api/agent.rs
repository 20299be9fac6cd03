//! Agent streaming endpoints (SSE) and HITL resume.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;

use cf_domain::stream::AgentEvent;
use cf_orchestration::hitl::HitlResume;

use crate::runtime::agent::SpotlightEvent;
use crate::state::AppState;

use super::{caller, require_worker_token, ApiResult};

fn agent_event_to_sse(event: &AgentEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .data(event.data().to_string())
}

fn agent_stream(
    mut rx: mpsc::Receiver<AgentEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let done = matches!(event, AgentEvent::Done | AgentEvent::Error { .. });
            yield Ok(agent_event_to_sse(&event));
            if done {
                break;
            }
        }
    }
}

fn spotlight_stream(
    mut rx: mpsc::Receiver<SpotlightEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match event {
                SpotlightEvent::Agent(event) => {
                    let done = matches!(event, AgentEvent::Done | AgentEvent::Error { .. });
                    yield Ok(agent_event_to_sse(&event));
                    if done {
                        break;
                    }
                }
                SpotlightEvent::Hitl(payload) => {
                    let data = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".into());
                    yield Ok(Event::default().event("hitl").data(data));
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VoiceStreamQuery {
    pub transcript_id: u64,
}

/// GET /v1/meetings/{id}/agent-stream?transcript_id= — the worker consumes
/// this after a wake-word trigger.
pub async fn voice_stream(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    Query(query): Query<VoiceStreamQuery>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    require_worker_token(&state, &headers)?;
    let rx = state.agent.voice_run(&meeting_id, query.transcript_id).await?;
    Ok(Sse::new(agent_stream(rx)).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
pub struct SpotlightRequest {
    pub message: String,
}

/// POST /v1/agent/spotlight — standalone assistant chat for the caller.
pub async fn spotlight(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SpotlightRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let claims = caller(&state, &headers)?;
    let rx = state
        .agent
        .spotlight_run(&claims.user_id, &request.message)
        .await?;
    Ok(Sse::new(spotlight_stream(rx)).keep_alive(KeepAlive::default()))
}

/// POST /v1/agent/hitl/{request_id} — resume a suspended mutation with
/// `{action: confirm|cancel, params?, silent?}`.
pub async fn hitl_resume(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    Json(resume): Json<HitlResume>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let _claims = caller(&state, &headers)?;
    let rx = state.agent.resume(&request_id, resume).await?;
    Ok(Sse::new(spotlight_stream(rx)).keep_alive(KeepAlive::default()))
}

/// GET /v1/agent/hitl — pending confirmations (dashboard).
pub async fn hitl_pending(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let _claims = caller(&state, &headers)?;
    Ok(Json(serde_json::json!({
        "pending": state.agent.hitl().list_pending(),
    })))
}
