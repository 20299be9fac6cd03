//! Transcript upload and context-update endpoints (worker → gateway).

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use cf_domain::error::Error;
use cf_domain::transcript::{TranscriptSegmentRequest, TranscriptSegmentResponse};

use crate::state::AppState;

use super::{require_worker_token, ApiResult};

/// Upload cap shared by media-bearing endpoints.
pub const MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

pub fn validate_upload_size(len: usize) -> Result<(), Error> {
    if len > MAX_UPLOAD_BYTES {
        return Err(Error::InvalidInput(format!(
            "payload of {len} bytes exceeds the {MAX_UPLOAD_BYTES} byte limit"
        )));
    }
    Ok(())
}

fn validate_segment(segment: &TranscriptSegmentRequest) -> Result<(), Error> {
    validate_upload_size(segment.text.len())?;
    if segment.user_id.is_empty() {
        return Err(Error::InvalidInput("user_id is required".into()));
    }
    if segment.end_ms < segment.start_ms {
        return Err(Error::InvalidInput("end_ms precedes start_ms".into()));
    }
    if !(0.0..=1.0).contains(&segment.confidence) {
        return Err(Error::InvalidInput("confidence out of range".into()));
    }
    Ok(())
}

/// POST /v1/meetings/{id}/transcript-segments
///
/// Persists the segment (ids are monotonic per meeting) and feeds the
/// context engine in the background — ingestion never blocks the worker's
/// upload path.
pub async fn append_segment(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    Json(segment): Json<TranscriptSegmentRequest>,
) -> ApiResult<Json<TranscriptSegmentResponse>> {
    require_worker_token(&state, &headers)?;
    validate_segment(&segment)?;

    let agent_call = segment.agent_call;
    let utterance = state.transcripts.append(&meeting_id, segment).await?;
    let id = utterance.id;
    tracing::debug!(
        meeting_id = %meeting_id,
        utterance_id = id,
        agent_call,
        "transcript segment stored"
    );

    let contexts = state.contexts.clone();
    let meeting = meeting_id.clone();
    tokio::spawn(async move {
        contexts.ingest(&meeting, utterance).await;
    });

    Ok(Json(TranscriptSegmentResponse { id }))
}

#[derive(Debug, Deserialize)]
pub struct ContextUpdateRequest {
    #[serde(default)]
    pub pre_transcript_id: Option<u64>,
}

/// POST /v1/meetings/{id}/agent-context — context pre-warm / realtime
/// refresh. Ensures the meeting's context manager is live and caught up to
/// the given transcript id.
pub async fn update_agent_context(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ContextUpdateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_worker_token(&state, &headers)?;

    let manager = state.contexts.get_or_create(&meeting_id).await;
    // Catch up on utterances the background ingest has not reached yet.
    if let Some(pre_transcript_id) = request.pre_transcript_id {
        let seen = manager
            .l0_utterances(None)
            .last()
            .map(|u| u.id)
            .unwrap_or(0);
        if seen < pre_transcript_id {
            match state.transcripts.recent(&meeting_id, 50).await {
                Ok(utterances) => {
                    for utterance in utterances.into_iter().filter(|u| u.id > seen) {
                        manager.add_utterance(utterance).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(meeting_id = %meeting_id, error = %e, "context catch-up failed");
                }
            }
        }
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}
