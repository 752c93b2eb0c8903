//! HTTP error responses for the web adapter.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::domain::error::RangeError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn status_from_error(err: &RangeError) -> StatusCode {
    match err {
        RangeError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        RangeError::NotFound { .. } => StatusCode::NOT_FOUND,
        RangeError::SourceUnavailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RangeError::ConfigParse { .. }
        | RangeError::ConfigMissing { .. }
        | RangeError::ConfigInvalid { .. }
        | RangeError::Export { .. }
        | RangeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<RangeError> for WebError {
    fn from(err: RangeError) -> Self {
        Self::new(status_from_error(&err), err.to_string())
    }
}

impl From<tokio::task::JoinError> for WebError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("worker task failed: {err}"))
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}
