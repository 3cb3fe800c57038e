use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AssertionResponse {
    /// The signed user assertion.
    pub assertion: String,
}
