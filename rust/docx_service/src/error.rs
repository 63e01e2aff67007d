//! Service errors and their HTTP mapping.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docx_from_html::DocxError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// An extractor rejected the request; keeps the extractor's status.
    #[error("{1}")]
    Rejected(StatusCode, String),

    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("invalid cover image: {0}")]
    InvalidCover(String),

    #[error("pandoc is not available: {0}")]
    PandocUnavailable(String),

    #[error("pandoc failed ({status}): {stderr}")]
    Pandoc { status: String, stderr: String },

    #[error("conversion timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error(transparent)]
    Docx(#[from] DocxError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::MissingInput(_) | ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Rejected(status, _) => *status,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::InvalidCover(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::PandocUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Pandoc { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Docx(DocxError::Empty) => StatusCode::BAD_REQUEST,
            ServiceError::Docx(DocxError::Image(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Docx(_) | ServiceError::Io(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_statuses() {
        assert_eq!(ServiceError::MissingInput("html".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::InvalidCover("x".into()).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            ServiceError::PandocUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::Pandoc {
                status: "exit status: 1".into(),
                stderr: String::new()
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::Timeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(ServiceError::Docx(DocxError::Empty).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::Internal("join".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn timeout_message_uses_seconds() {
        assert_eq!(
            ServiceError::Timeout(Duration::from_secs(60)).to_string(),
            "conversion timed out after 60s"
        );
    }
}
