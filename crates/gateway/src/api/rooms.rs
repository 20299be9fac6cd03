//! Meeting room REST: room payload, start/end transitions, worker-reported
//! completion.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use cf_domain::error::Error;
use cf_domain::stores::{MeetingRecord, MeetingStatus};

use crate::state::AppState;

use super::{caller, require_worker_token, ApiResult};

fn ensure_participant(meeting: &MeetingRecord, user_id: &str) -> ApiResult<()> {
    let member = meeting.host_id == user_id || meeting.participant_ids.iter().any(|p| p == user_id);
    if member {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!("user {user_id} is not a participant")).into())
    }
}

fn ensure_host(meeting: &MeetingRecord, user_id: &str) -> ApiResult<()> {
    if meeting.host_id == user_id {
        Ok(())
    } else {
        Err(Error::PermissionDenied("host role required".into()).into())
    }
}

/// GET /v1/meetings/{id}/room
pub async fn room(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let claims = caller(&state, &headers)?;
    let meeting = state.meetings.get(&meeting_id).await?;
    ensure_participant(&meeting, &claims.user_id)?;

    let participants = state.registry.participants(&meeting_id);
    Ok(Json(serde_json::json!({
        "meetingId": meeting.id,
        "status": meeting.status,
        "participants": participants,
        "iceServers": state.config.server.ice_servers,
        "maxParticipants": state.config.server.max_participants,
    })))
}

/// POST /v1/meetings/{id}/start — host only, SCHEDULED → ONGOING. Also
/// provisions the meeting's realtime worker.
pub async fn start(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let claims = caller(&state, &headers)?;
    let meeting = state.meetings.get(&meeting_id).await?;
    ensure_host(&meeting, &claims.user_id)?;

    let meeting = state
        .meetings
        .set_status(&meeting_id, MeetingStatus::Ongoing)
        .await?;

    match state.workers.start(&meeting_id).await {
        Ok(assignment) => {
            tracing::info!(
                meeting_id = %meeting_id,
                worker_id = %assignment.worker_id,
                credential_index = assignment.credential_index,
                "meeting started"
            );
        }
        Err(e) => {
            // The meeting still runs; transcription is degraded until a
            // retry succeeds.
            tracing::error!(meeting_id = %meeting_id, error = %e, "worker provisioning failed");
        }
    }

    Ok(Json(serde_json::json!({ "meetingId": meeting.id, "status": meeting.status })))
}

/// POST /v1/meetings/{id}/end — host only, ONGOING → COMPLETED.
pub async fn end(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let claims = caller(&state, &headers)?;
    let meeting = state.meetings.get(&meeting_id).await?;
    ensure_host(&meeting, &claims.user_id)?;

    let meeting = state
        .meetings
        .set_status(&meeting_id, MeetingStatus::Completed)
        .await?;
    let worker_id = crate::runtime::worker::worker_name(&meeting_id);
    let _ = state.workers.stop(&worker_id).await;
    state.contexts.drop_meeting(&meeting_id);

    Ok(Json(serde_json::json!({ "meetingId": meeting.id, "status": meeting.status })))
}

/// POST /v1/meetings/{id}/complete — worker callback after the last human
/// participant left and the grace period elapsed.
pub async fn complete(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    require_worker_token(&state, &headers)?;

    match state
        .meetings
        .set_status(&meeting_id, MeetingStatus::Completed)
        .await
    {
        Ok(_) => {}
        // Already completed (host ended it first) is fine.
        Err(Error::Conflict(_)) => {}
        Err(e) => return Err(e.into()),
    }
    state.workers.complete(&meeting_id).await?;
    state.contexts.drop_meeting(&meeting_id);
    tracing::info!(meeting_id = %meeting_id, "meeting completed by worker");

    Ok(Json(serde_json::json!({ "meetingId": meeting_id, "status": MeetingStatus::Completed })))
}
