use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use tracing::warn;

use crate::api::v1::dto::{
    authorize_request::AuthorizeRequest, authorize_response::AuthorizeResponse,
};
use crate::error::AppError;
use crate::state::AppState;

pub async fn authorize(
    State(state): State<AppState>,
    payload: Result<Json<AuthorizeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthorizeResponse>), AppError> {
    let Json(req) = payload.map_err(|rej| {
        warn!(rejection = %rej.body_text(), "authorize request body missing or unreadable");
        AppError::MalformedInput("request body must be a JSON object with a token".to_string())
    })?;

    let authorization = state.authorize.authorize(&req.token).await?;

    Ok((StatusCode::OK, Json(AuthorizeResponse::from(authorization))))
}
