use axum::{Router, routing::post};

use crate::api::v1::handlers::authorize::authorize;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/authorize", post(authorize))
        .with_state(state)
}
