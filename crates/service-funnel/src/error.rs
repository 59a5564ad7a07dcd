use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use funnel_common::error::CommonError;
use funnel_common::openai::OpenAiClientError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("parse error at row {row}: {message}")]
    Parse { row: usize, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("text generation failed: {0}")]
    Upstream(#[from] OpenAiClientError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    RateLimited(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Config(_)
            | AppError::Parse { .. }
            | AppError::Upstream(_)
            | AppError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body. `detail` matches what the web client already reads.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
