use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use aidlink_types::error::CoreError;

/// Carries a core error across the axum boundary with the right status
/// code and a small JSON body.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::TransientStorage(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Storage detail stays in the logs, not in the response body.
        let message = if status.is_server_error() {
            error!("request failed: {}", self.0);
            "internal storage failure".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub(crate) fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError(CoreError::Storage("background task failed".into()))
}
