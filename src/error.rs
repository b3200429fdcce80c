use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::client::ClientError;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    AuthRequired(String),
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg).into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            ApiError::AuthRequired(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg).into_response(),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg).into_response(),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(value: ClientError) -> Self {
        match value {
            ClientError::InvalidCredentials | ClientError::AuthExpired => ApiError::AuthRequired(
                "FitBlocks session could not be authenticated; check credentials".into(),
            ),
            // Remote business-rule refusals pass through verbatim.
            ClientError::Rejected(msg) => ApiError::Conflict(msg),
            ClientError::NotFound => ApiError::NotFound("registration not found".into()),
            ClientError::Unreachable(err) => {
                error!("upstream error: {err}");
                ApiError::Upstream("Failed to reach the FitBlocks server".into())
            }
            ClientError::Unexpected(msg) => {
                error!("unexpected upstream response: {msg}");
                ApiError::Upstream(msg)
            }
        }
    }
}
