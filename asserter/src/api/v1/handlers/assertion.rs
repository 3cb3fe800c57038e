use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use tracing::warn;

use crate::api::v1::dto::{
    assertion_request::AssertionRequest, assertion_response::AssertionResponse,
};
use crate::error::AppError;
use crate::state::AppState;

pub async fn issue_assertion(
    State(state): State<AppState>,
    payload: Result<Json<AssertionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AssertionResponse>), AppError> {
    let Json(req) = payload.map_err(|rej| {
        warn!(rejection = %rej.body_text(), "assertion request body missing or unreadable");
        AppError::MissingInput
    })?;

    let assertion = state.assertions.issue(
        &req.username,
        &req.scopes,
        req.seconds,
        req.api_key.as_deref(),
    )?;

    Ok((StatusCode::OK, Json(AssertionResponse { assertion })))
}
