//! Secret retrieval collaborators.
//!
//! Secret-valued configuration options are references (vault identifiers or
//! environment variable names), resolved once per invocation. The vault
//! itself is an external collaborator; only the fetch contract lives here.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use thiserror::Error;
use tracing::error;
use url::Url;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret backend error: {0}")]
    Backend(String),

    #[error("secret content is not valid base64 text")]
    Decode,
}

/// Resolve a secret reference into its plaintext value.
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<String, SecretError>;
}

/// Resolves secret references from environment variables.
///
/// Development/test backend; production deployments use [`VaultSecrets`].
pub struct EnvSecrets;

#[async_trait]
impl SecretSource for EnvSecrets {
    async fn fetch(&self, reference: &str) -> Result<String, SecretError> {
        std::env::var(reference).map_err(|_| SecretError::NotFound(reference.to_string()))
    }
}

/// Fetches base64-encoded secret bundles from a vault endpoint.
pub struct VaultSecrets {
    http: reqwest::Client,
    endpoint: Url,
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    content: String,
}

impl VaultSecrets {
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    fn bundle_url(&self, reference: &str) -> Result<Url, SecretError> {
        self.endpoint
            .join(&format!("secrets/{reference}/bundle"))
            .map_err(|e| SecretError::Backend(e.to_string()))
    }
}

#[async_trait]
impl SecretSource for VaultSecrets {
    async fn fetch(&self, reference: &str) -> Result<String, SecretError> {
        let url = self.bundle_url(reference)?;

        let resp = self.http.get(url).send().await.map_err(|e| {
            error!(reference, error = %e, "vault request failed");
            SecretError::Backend(e.to_string())
        })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SecretError::NotFound(reference.to_string()));
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| SecretError::Backend(e.to_string()))?;

        let bundle: SecretBundle = resp
            .json()
            .await
            .map_err(|e| SecretError::Backend(e.to_string()))?;

        decode_bundle_content(&bundle.content)
    }
}

/// Vault bundles carry the secret value base64-encoded.
fn decode_bundle_content(content: &str) -> Result<String, SecretError> {
    let bytes = STANDARD
        .decode(content.trim())
        .map_err(|_| SecretError::Decode)?;
    String::from_utf8(bytes).map_err(|_| SecretError::Decode)
}
