use std::sync::Arc;

use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};

use rulecheck_core::CheckResponse;

use crate::error::ApiError;
use crate::state::AppState;
use crate::upload;

/// `POST /check-pdf`: judge the uploaded PDF against each submitted rule.
pub async fn check_pdf(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CheckResponse>, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::BadForm(e.body_text()))?;
    let input = upload::parse_multipart(multipart).await.map_err(|e| {
        tracing::warn!(error = %e, "rejected unreadable form body");
        ApiError::BadForm(e)
    })?;

    let response = state.checker.check(input).await.map_err(|e| {
        if e.is_client_error() {
            tracing::info!(error = %e, "rejected check request");
        }
        ApiError::from(e)
    })?;

    Ok(Json(response))
}
