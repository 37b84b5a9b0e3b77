//! Mapping of [`MailsinkError`] onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::MailsinkError;

/// Handler error: a [`MailsinkError`] rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError(pub MailsinkError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            MailsinkError::NotFound(_) => StatusCode::NOT_FOUND,
            MailsinkError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            MailsinkError::MalformedMessage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MailsinkError> for ApiError {
    fn from(err: MailsinkError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "Request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
