use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use rulecheck_core::CheckError;

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// A request-level failure rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// The multipart body itself could not be read.
    BadForm(String),
    Check(CheckError),
}

impl From<CheckError> for ApiError {
    fn from(e: CheckError) -> Self {
        ApiError::Check(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadForm(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Check(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Check(CheckError::Internal(detail)) => {
                tracing::error!(error = %detail, "internal error while checking PDF");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
            ApiError::Check(e) => {
                tracing::error!(error = %e, "PDF check failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
