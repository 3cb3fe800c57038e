use serde::Deserialize;

/// Request body for `/authorize`: the caller's signed user assertion.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    pub token: String,
}
