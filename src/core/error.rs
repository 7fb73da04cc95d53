use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Domain error taxonomy. `Validation`/`InvalidState`/`NotFound` surface
/// synchronously to HTTP callers; `PlatformUnavailable`/`Publish`/`Timeout`
/// are caught inside a delivery round and turned into error-log rows.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    NotFound(String),

    #[error("platform unavailable: {0}")]
    PlatformUnavailable(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("publish timed out after {0}s")]
    Timeout(u64),

    #[error("storage error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Name recorded in `error_log.error_type`.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::InvalidState(_) => "InvalidStateError",
            Error::NotFound(_) => "NotFoundError",
            Error::PlatformUnavailable(_) => "PlatformUnavailable",
            Error::Publish(_) => "PublishError",
            Error::Timeout(_) => "Timeout",
            Error::Persistence(_) => "PersistenceError",
        }
    }

    /// Short machine code recorded in `error_log.error_code`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::NotFound(_) => "NOT_FOUND",
            Error::PlatformUnavailable(_) => "PLATFORM_UNAVAILABLE",
            Error::Publish(_) => "POSTING_ERROR",
            Error::Timeout(_) => "PUBLISH_TIMEOUT",
            Error::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            // Dispatch-phase errors should not reach HTTP callers, but map
            // them sensibly if one ever does.
            Error::PlatformUnavailable(_) => StatusCode::BAD_REQUEST,
            Error::Publish(_) | Error::Timeout(_) => StatusCode::BAD_GATEWAY,
            Error::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_api_contract() {
        assert_eq!(
            Error::validation("no platforms selected").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::not_found("Task not found").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::invalid_state("already approved").status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn error_types_match_log_taxonomy() {
        assert_eq!(Error::Timeout(30).error_type(), "Timeout");
        assert_eq!(Error::Publish("boom".into()).error_code(), "POSTING_ERROR");
        assert_eq!(
            Error::PlatformUnavailable("expired".into()).error_code(),
            "PLATFORM_UNAVAILABLE"
        );
    }
}
