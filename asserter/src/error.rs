use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("request body required")]
    MissingInput,

    #[error("invalid api key")]
    InvalidApiKey,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal server error")]
    Internal,
}

/// This service is internal (only the authorizer calls it), so the error
/// message goes in the body instead of a bare challenge.
#[derive(Serialize)]
struct ErrorResponseBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MissingInput | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponseBody {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
