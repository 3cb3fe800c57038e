use serde::Deserialize;

/// Request body for `/assertion`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssertionRequest {
    /// Principal the assertion is minted for (`prn`/`sub`).
    pub username: String,

    /// Assertion lifetime in seconds. Defaults to one hour when omitted.
    pub seconds: Option<u64>,

    /// Scopes to embed into the assertion. Embedded only when non-empty.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Caller-supplied API key; checked only when the service has one configured.
    #[serde(rename = "api-key")]
    pub api_key: Option<String>,
}
