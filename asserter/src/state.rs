use std::sync::Arc;

use crate::services::auth::assertion_issuer::AssertionService;

#[derive(Clone)]
pub struct AppState {
    pub assertions: Arc<AssertionService>,
}

impl AppState {
    pub fn new(assertions: Arc<AssertionService>) -> Self {
        Self { assertions }
    }
}
