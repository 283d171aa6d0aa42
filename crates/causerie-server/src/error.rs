use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use causerie_shared::ChatError;

/// REST-boundary error: a chat-core failure or a transport-level rejection.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    #[error("Media too large: {size} bytes (max {max})")]
    MediaTooLarge { size: usize, max: usize },

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Chat(err) => (chat_status(err), err.code(), err.to_string()),
            ApiError::MediaNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::MediaTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "MALFORMED", self.to_string())
            }
            ApiError::UnsupportedMedia(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "MALFORMED", self.to_string())
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "MALFORMED", self.to_string()),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let body = serde_json::json!({
            "code": code,
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn chat_status(err: &ChatError) -> StatusCode {
    match err {
        ChatError::PermissionDenied | ChatError::NotAMember => StatusCode::FORBIDDEN,
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::DuplicateIdentifier(_)
        | ChatError::DuplicateName(_)
        | ChatError::AlreadyMember => StatusCode::CONFLICT,
        ChatError::GroupFull => StatusCode::UNPROCESSABLE_ENTITY,
        ChatError::InvalidCredential | ChatError::AuthRequired => StatusCode::UNAUTHORIZED,
        ChatError::Malformed(_) => StatusCode::BAD_REQUEST,
        ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
