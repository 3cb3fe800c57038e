use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Challenge returned with every deny, pointing the caller at the identity
/// provider realm.
pub const WWW_AUTHENTICATE: &str = "Bearer realm=\"identity.oraclecloud.com\"";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("no scopes requested")]
    NoScopesRequested,

    #[error("gateway scope not requested")]
    GatewayScopeMissing,

    #[error("token signature invalid")]
    SignatureInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("token audience mismatch")]
    AudienceMismatch,

    #[error("key resolution failed: {0}")]
    KeyResolution(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("delegated assertion request failed: {0}")]
    DownstreamAssertion(String),

    #[error("internal server error")]
    Internal,
}

/// Deny response body. Every failure collapses to this single shape; the
/// reason stays in the logs and never reaches the caller.
#[derive(Serialize)]
struct DenyBody {
    active: bool,
    #[serde(rename = "wwwAuthenticate")]
    www_authenticate: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "authorization denied");

        let body = DenyBody {
            active: false,
            www_authenticate: WWW_AUTHENTICATE,
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
