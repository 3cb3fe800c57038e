use axum::{Router, routing::post};

use crate::api::v1::handlers::assertion::issue_assertion;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/assertion", post(issue_assertion))
        .with_state(state)
}
