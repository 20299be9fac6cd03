//! Shared error type used across all Confab crates.
//!
//! The variants mirror how failures are surfaced at the boundaries: signaling
//! replies with an `error` message carrying `code`, REST maps to an HTTP
//! status, and everything else is logged and degraded locally.

/// Shared error type used across all Confab crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("credential pool exhausted")]
    QuotaExhausted,

    /// A collaborator (LLM / STT / TTS / storage / orchestrator API) failed.
    /// Recoverable: callers degrade or retry locally.
    #[error("{service}: {message}")]
    External { service: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build an [`Error::External`] from any displayable collaborator failure.
    pub fn external(service: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::External {
            service: service.into(),
            message: err.to_string(),
        }
    }

    /// Stable wire code, used by the signaling `error` message and REST bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::PermissionDenied(_) => "permission_denied",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::Conflict(_) => "conflict",
            Error::QuotaExhausted => "quota_exhausted",
            Error::External { .. } | Error::Timeout(_) => "external_failure",
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => "internal_error",
        }
    }

    /// HTTP status the REST layer maps this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::PermissionDenied(_) => 403,
            Error::NotFound(_) => 404,
            Error::InvalidInput(_) => 400,
            Error::Conflict(_) => 409,
            Error::QuotaExhausted => 503,
            Error::External { .. } | Error::Timeout(_) => 502,
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(Error::PermissionDenied("x".into()).code(), "permission_denied");
        assert_eq!(Error::NotFound("m".into()).code(), "not_found");
        assert_eq!(Error::InvalidInput("b".into()).code(), "invalid_input");
        assert_eq!(Error::Conflict("c".into()).code(), "conflict");
        assert_eq!(Error::QuotaExhausted.code(), "quota_exhausted");
        assert_eq!(Error::external("llm", "boom").code(), "external_failure");
        assert_eq!(Error::Internal("bug".into()).code(), "internal_error");
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(Error::PermissionDenied("x".into()).http_status(), 403);
        assert_eq!(Error::NotFound("m".into()).http_status(), 404);
        assert_eq!(Error::InvalidInput("b".into()).http_status(), 400);
        assert_eq!(Error::Conflict("c".into()).http_status(), 409);
        assert_eq!(Error::QuotaExhausted.http_status(), 503);
        assert_eq!(Error::external("stt", "down").http_status(), 502);
    }

    #[test]
    fn external_formats_service_and_message() {
        let err = Error::external("tts", "connection refused");
        assert_eq!(err.to_string(), "tts: connection refused");
    }
}
