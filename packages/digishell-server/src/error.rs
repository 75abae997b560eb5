use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use digishell_core::{LinkError, LiveTxError};
use serde::Serialize;
use tracing::debug;

/// Error body shared by every endpoint: `{"detail": "..."}`
#[derive(Debug)]
pub enum ApiError {
    NotConnected,
    /// The remote call failed
    Remote(String),
    BadRequest(String),
    /// Request does not fit the current live transmission state
    Conflict(String),
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Remote(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn detail(self) -> String {
        match self {
            ApiError::NotConnected => LinkError::NotConnected.to_string(),
            ApiError::Remote(detail)
            | ApiError::BadRequest(detail)
            | ApiError::Conflict(detail)
            | ApiError::NotFound(detail) => detail,
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::NotConnected => ApiError::NotConnected,
            other => ApiError::Remote(other.to_string()),
        }
    }
}

impl From<LiveTxError> for ApiError {
    fn from(err: LiveTxError) -> Self {
        match err {
            LiveTxError::Link(link) => link.into(),
            LiveTxError::EmptyText => ApiError::BadRequest(err.to_string()),
            LiveTxError::AlreadyActive | LiveTxError::NotActive | LiveTxError::AlreadyEnding => {
                ApiError::Conflict(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        debug!(status = status.as_u16(), %detail, "request failed");
        (status, Json(ErrorBody { detail })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
