use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::AppError;

/// RS256 signer for user assertions.
#[derive(Clone)]
pub struct AssertionSigner {
    issuer: String,
    audience: String,
    key_id: String,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for AssertionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("AssertionSigner")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl AssertionSigner {
    /// `private_key_pem` must be an RSA private key in PKCS#8 PEM format.
    pub fn new(
        private_key_pem: &str,
        issuer: String,
        audience: String,
        key_id: String,
    ) -> Result<Self, AppError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).map_err(|e| {
            warn!(error = %e, "failed to parse assertion signing key PEM (expected RSA PKCS#8 PEM)");
            AppError::Internal
        })?;

        Ok(Self {
            issuer,
            audience,
            key_id,
            encoding_key,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AppError> {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.key_id.clone());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "failed to sign assertion");
            AppError::Internal
        })
    }
}
