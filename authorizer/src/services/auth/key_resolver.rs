//! Verification-key resolution.
//!
//! The inbound assertion verifies against a locally configured key shared
//! with the asserter; exchanged access tokens verify against keys fetched
//! from the identity provider's remote key set, selected by the token's
//! `kid` header.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use tracing::debug;
use url::Url;

use crate::error::AppError;

/// Build the statically configured verification key from PEM material.
pub fn static_key(public_key_pem: &str) -> Result<DecodingKey, AppError> {
    DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
        .map_err(|e| AppError::KeyResolution(format!("invalid verification key PEM: {e}")))
}

/// Resolve the verification key for a token by its `kid` header.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<DecodingKey, AppError>;
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

/// How long a fetched key-set document stays good.
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Fetches and caches the identity provider's JWKS document.
///
/// The document is cached for [`JWKS_TTL`] and refreshed once when a `kid`
/// is not found, which tolerates routine key rotation without a network
/// round trip on every invocation. The cache is a replace-only slot, safe
/// for concurrent read/fetch-on-miss access.
pub struct RemoteJwksResolver {
    http: reqwest::Client,
    jwks_url: Url,
    cache: Mutex<Option<CachedJwks>>,
}

impl RemoteJwksResolver {
    pub fn new(http: reqwest::Client, jwks_url: Url) -> Self {
        Self {
            http,
            jwks_url,
            cache: Mutex::new(None),
        }
    }

    async fn jwks(&self, force_refresh: bool) -> Result<JwkSet, AppError> {
        if !force_refresh {
            if let Some(cached) = self.lock().as_ref() {
                if cached.fetched_at.elapsed() < JWKS_TTL {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(url = %self.jwks_url, "fetching remote JWKS");
        let keys: JwkSet = self
            .http
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(|e| AppError::KeyResolution(format!("JWKS endpoint unreachable: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::KeyResolution(format!("JWKS endpoint returned an error: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::KeyResolution(format!("JWKS document unreadable: {e}")))?;

        *self.lock() = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CachedJwks>> {
        // A poisoned replace-only cache is still usable.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyResolver for RemoteJwksResolver {
    async fn resolve(&self, token: &str) -> Result<DecodingKey, AppError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AppError::KeyResolution(format!("unreadable token header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::KeyResolution("token header carries no kid".to_string()))?;

        let jwks = self.jwks(false).await?;
        if let Some(key) = find_key(&jwks, &kid) {
            return key;
        }

        // Unknown kid: refresh once to pick up rotated keys, then give up.
        debug!(kid = %kid, "kid not in cached JWKS, refreshing");
        let jwks = self.jwks(true).await?;
        find_key(&jwks, &kid)
            .unwrap_or_else(|| Err(AppError::KeyResolution(format!("no key matches kid {kid}"))))
    }
}

/// Convert the JWK matching `kid` into a decoding key.
fn find_key(jwks: &JwkSet, kid: &str) -> Option<Result<DecodingKey, AppError>> {
    let jwk = jwks
        .keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))?;

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => Some(
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| AppError::KeyResolution(format!("invalid RSA key components: {e}"))),
        ),
        _ => Some(Err(AppError::KeyResolution(format!(
            "key {kid} is not an RSA key"
        )))),
    }
}
