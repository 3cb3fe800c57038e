use serde::Serialize;
use tracing::debug;

use crate::error::AppError;
use crate::services::auth::signer::AssertionSigner;

/// Assertion lifetime when the caller does not pick one.
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    prn: &'a str,
    sub: &'a str,
    iss: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    scopes: Option<&'a [String]>,
}

/// Mints signed user assertions.
#[derive(Clone, Debug)]
pub struct AssertionService {
    signer: AssertionSigner,
    required_api_key: Option<String>,
}

impl AssertionService {
    pub fn new(signer: AssertionSigner, required_api_key: Option<String>) -> Self {
        Self {
            signer,
            required_api_key,
        }
    }

    /// Mint a signed assertion for `username`.
    ///
    /// - `ttl_seconds` defaults to one hour when unspecified.
    /// - `scopes` is embedded only when non-empty.
    /// - When an API key is configured, the caller-supplied key must match exactly.
    pub fn issue(
        &self,
        username: &str,
        scopes: &[String],
        ttl_seconds: Option<u64>,
        api_key: Option<&str>,
    ) -> Result<String, AppError> {
        if username.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "username must not be empty".to_string(),
            ));
        }

        if let Some(required) = self.required_api_key.as_deref() {
            if api_key != Some(required) {
                return Err(AppError::InvalidApiKey);
            }
        }

        let ttl = ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS);
        let iat = chrono::Utc::now().timestamp();
        let exp = iat + ttl as i64;

        debug!(username, ttl, scope_count = scopes.len(), "issuing user assertion");

        let claims = AssertionClaims {
            prn: username,
            sub: username,
            iss: self.signer.issuer(),
            aud: self.signer.audience(),
            iat,
            exp,
            scopes: (!scopes.is_empty()).then_some(scopes),
        };

        self.signer.sign(&claims)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{Algorithm, DecodingKey, TokenData, Validation};
    use serde::Deserialize;

    use super::*;
    use crate::services::auth::test_keys;

    const ISSUER: &str = "test-app-id";
    const AUDIENCE: &str = "https://identity.example.com/";

    #[derive(Debug, Deserialize)]
    struct DecodedClaims {
        prn: String,
        sub: String,
        iss: String,
        aud: String,
        iat: i64,
        exp: i64,
        #[serde(default)]
        scopes: Option<Vec<String>>,
    }

    fn service(required_api_key: Option<&str>) -> AssertionService {
        let signer = AssertionSigner::new(
            test_keys::RSA_PRIVATE_KEY_PEM,
            ISSUER.to_string(),
            AUDIENCE.to_string(),
            "test-kid".to_string(),
        )
        .expect("signer builds from test key");
        AssertionService::new(signer, required_api_key.map(str::to_string))
    }

    fn decode(token: &str) -> TokenData<DecodedClaims> {
        let key = DecodingKey::from_rsa_pem(test_keys::RSA_PUBLIC_KEY_PEM.as_bytes())
            .expect("test public key");
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[AUDIENCE]);
        jsonwebtoken::decode::<DecodedClaims>(token, &key, &validation)
            .expect("assertion verifies against the test public key")
    }

    #[test]
    fn issue_round_trips_principal_and_ttl() {
        let token = service(None).issue("alice", &[], Some(1800), None).unwrap();
        let decoded = decode(&token);

        assert_eq!(decoded.claims.prn, "alice");
        assert_eq!(decoded.claims.sub, "alice");
        assert_eq!(decoded.claims.iss, ISSUER);
        assert_eq!(decoded.claims.aud, AUDIENCE);
        assert_eq!(decoded.claims.exp - decoded.claims.iat, 1800);
        assert!(decoded.claims.scopes.is_none());
    }

    #[test]
    fn issue_defaults_ttl_to_one_hour() {
        let token = service(None).issue("alice", &[], None, None).unwrap();
        let decoded = decode(&token);

        assert_eq!(decoded.claims.exp - decoded.claims.iat, 3600);
    }

    #[test]
    fn issue_embeds_scopes_only_when_non_empty() {
        let scopes = vec!["custom.read".to_string(), "custom.write".to_string()];
        let token = service(None).issue("alice", &scopes, None, None).unwrap();
        let decoded = decode(&token);

        assert_eq!(decoded.claims.scopes, Some(scopes));
        assert_eq!(decoded.header.kid.as_deref(), Some("test-kid"));
    }

    #[test]
    fn issue_rejects_empty_username() {
        let err = service(None).issue("  ", &[], None, None).unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[test]
    fn issue_enforces_configured_api_key() {
        let svc = service(Some("sekret"));

        assert!(matches!(
            svc.issue("alice", &[], None, None),
            Err(AppError::InvalidApiKey)
        ));
        assert!(matches!(
            svc.issue("alice", &[], None, Some("wrong")),
            Err(AppError::InvalidApiKey)
        ));
        assert!(svc.issue("alice", &[], None, Some("sekret")).is_ok());
    }

    #[test]
    fn issue_ignores_api_key_when_not_configured() {
        assert!(service(None).issue("alice", &[], None, Some("anything")).is_ok());
    }
}
