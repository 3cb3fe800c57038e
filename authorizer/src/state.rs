use std::sync::Arc;

use crate::services::auth::AuthorizeService;

#[derive(Clone)]
pub struct AppState {
    pub authorize: Arc<AuthorizeService>,
}

impl AppState {
    pub fn new(authorize: Arc<AuthorizeService>) -> Self {
        Self { authorize }
    }
}
