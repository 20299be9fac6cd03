//! REST/SSE surface.

pub mod agent;
pub mod rooms;
pub mod router;
pub mod transcripts;
pub mod workers;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use cf_domain::error::Error;

use crate::auth::{token_matches, AuthClaims};
use crate::state::AppState;

/// Wrapper mapping the domain error taxonomy onto HTTP responses.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the calling user from the `Authorization` header.
pub fn caller(state: &AppState, headers: &HeaderMap) -> ApiResult<AuthClaims> {
    let token = bearer_token(headers)
        .ok_or_else(|| Error::PermissionDenied("missing bearer token".into()))?;
    Ok(state.auth.verify(token)?)
}

/// Gate worker/admin endpoints behind the shared API token. With no token
/// configured (dev mode) every caller passes.
pub fn require_worker_token(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = &state.api_token_hash else {
        return Ok(());
    };
    let provided = bearer_token(headers).unwrap_or("");
    if token_matches(provided, expected) {
        Ok(())
    } else {
        Err(Error::PermissionDenied("invalid API token".into()).into())
    }
}
