//! The authorization state machine.
//!
//! One linear pass per invocation: decode → scope classification → gateway
//! exchange → optional delegated exchange → response construction. Every step
//! is fallible and every failure short-circuits to the single deny terminal;
//! there is no retry and no partial success.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{Config, GATEWAY_SCOPE_SUFFIX};
use crate::error::AppError;
use crate::services::auth::asserter_client::AssertionProvider;
use crate::services::auth::claims::TokenClaims;
use crate::services::auth::idp_client::TokenExchanger;
use crate::services::auth::key_resolver::{self, KeyResolver};
use crate::services::auth::verifier;
use crate::services::secrets::SecretSource;

/// Outcome of a successful authorization; the handler maps it onto the
/// response DTO.
#[derive(Clone, Debug)]
pub struct Authorization {
    pub principal: String,
    pub scope: Vec<String>,
    pub expires_at: DateTime<Utc>,
    /// Downstream access token to forward to the backend, when one was minted.
    pub access_token: Option<String>,
}

pub struct AuthorizeService {
    idp_issuer: String,
    client_secret_ref: String,
    asserter_public_key_ref: String,
    gateway_audience: String,
    downstream_audience: String,
    delegate_downstream_scopes: bool,
    secrets: Arc<dyn SecretSource>,
    keys: Arc<dyn KeyResolver>,
    exchanger: Arc<dyn TokenExchanger>,
    asserter: Arc<dyn AssertionProvider>,
}

impl AuthorizeService {
    pub fn new(
        config: &Config,
        secrets: Arc<dyn SecretSource>,
        keys: Arc<dyn KeyResolver>,
        exchanger: Arc<dyn TokenExchanger>,
        asserter: Arc<dyn AssertionProvider>,
    ) -> Self {
        Self {
            idp_issuer: config.idp_issuer.clone(),
            client_secret_ref: config.idp_client_secret_ref.clone(),
            asserter_public_key_ref: config.asserter_public_key_ref.clone(),
            gateway_audience: config.gateway_audience.clone(),
            downstream_audience: config.downstream_audience.clone(),
            delegate_downstream_scopes: config.delegate_downstream_scopes,
            secrets,
            keys,
            exchanger,
            asserter,
        }
    }

    /// The scope reserved for the gateway's own self-check.
    fn gateway_scope(&self) -> String {
        format!("{}{}", self.gateway_audience, GATEWAY_SCOPE_SUFFIX)
    }

    /// Drive one authorization request to Done or Deny.
    pub async fn authorize(&self, token: &str) -> Result<Authorization, AppError> {
        // Scope classification runs before anything else so that requests we
        // can refuse on sight fail without touching the vault or the network.
        let requested = verifier::decode_unverified(token)?;
        let mut scopes = requested.requested_scopes();
        if scopes.is_empty() {
            return Err(AppError::NoScopesRequested);
        }

        let gateway_scope = self.gateway_scope();
        let Some(gateway_at) = scopes.iter().position(|s| *s == gateway_scope) else {
            // A request that skips the gateway's own check leaves the rest of
            // the flow with nothing to anchor to; deny instead of guessing.
            return Err(AppError::GatewayScopeMissing);
        };

        // Per-invocation secrets.
        let client_secret = self.fetch_secret(&self.client_secret_ref).await?;
        let asserter_public_key = self.fetch_secret(&self.asserter_public_key_ref).await?;

        // Double binding: the assertion must verify against the key pair
        // shared with the asserter AND name the identity provider's issuer as
        // its audience.
        let local_key = key_resolver::static_key(&asserter_public_key)?;
        let assertion = verifier::decode_claims(token, &local_key, &self.idp_issuer)?;
        let principal = assertion
            .principal()
            .ok_or_else(|| AppError::MalformedInput("assertion carries no principal".to_string()))?
            .to_owned();
        debug!(principal = %principal, issued_at = assertion.iat, "inbound assertion verified");

        // Gateway self-check: exchange, re-verify, then consume the scope.
        let gateway_token = self
            .exchanger
            .exchange_user_assertion(token, &gateway_scope, &client_secret)
            .await?;
        let gateway_claims = self
            .verify_access_token(&gateway_token, &self.gateway_audience)
            .await?;
        scopes.remove(gateway_at);
        debug!(principal = %principal, remaining = scopes.len(), "gateway exchange verified");

        if scopes.is_empty() {
            // Nothing left for the backend; answer from the gateway token.
            info!(principal = %principal, "authorized with gateway scope only");
            return Ok(Authorization {
                principal,
                scope: gateway_claims.granted_scopes(),
                expires_at: expires_at(&gateway_claims)?,
                access_token: None,
            });
        }

        // Remaining scopes ride on a fresh delegated assertion.
        let delegated_scopes: &[String] = if self.delegate_downstream_scopes {
            &scopes
        } else {
            &[]
        };
        let delegated = self
            .asserter
            .delegated_assertion(&principal, delegated_scopes)
            .await?;

        let downstream_scope = scopes.join(" ");
        let downstream_token = self
            .exchanger
            .exchange_user_assertion(&delegated, &downstream_scope, &client_secret)
            .await?;
        let downstream_claims = self
            .verify_access_token(&downstream_token, &self.downstream_audience)
            .await?;

        info!(principal = %principal, scope = %downstream_scope, "authorized with downstream access token");
        Ok(Authorization {
            principal,
            scope: downstream_claims.granted_scopes(),
            expires_at: expires_at(&downstream_claims)?,
            access_token: Some(downstream_token),
        })
    }

    async fn fetch_secret(&self, reference: &str) -> Result<String, AppError> {
        self.secrets.fetch(reference).await.map_err(|e| {
            tracing::error!(reference, error = %e, "secret retrieval failed");
            AppError::Internal
        })
    }

    /// Re-verify an identity-provider token against the remote key set.
    async fn verify_access_token(
        &self,
        access_token: &str,
        audience: &str,
    ) -> Result<TokenClaims, AppError> {
        let key = self.keys.resolve(access_token).await?;
        verifier::decode_claims(access_token, &key, audience)
    }
}

/// `expiresAt` always derives from the verified token answering the request,
/// never from the inbound assertion.
fn expires_at(claims: &TokenClaims) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp(claims.exp as i64, 0).ok_or(AppError::Internal)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
    use serde_json::json;

    use super::*;
    use crate::services::auth::test_keys;
    use crate::services::secrets::SecretError;

    const IDP_ISSUER: &str = "https://idp.example.com";
    const GATEWAY_AUDIENCE: &str = "https://gw.example.com";
    const DOWNSTREAM_AUDIENCE: &str = "https://backend.example.com";
    const CLIENT_SECRET_REF: &str = "client-secret-ref";
    const ASSERTER_KEY_REF: &str = "asserter-key-ref";

    fn gateway_scope() -> String {
        format!("{GATEWAY_AUDIENCE}{GATEWAY_SCOPE_SUFFIX}")
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn sign(claims: &serde_json::Value, private_pem: &str) -> String {
        let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("private key");
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &key).expect("signed token")
    }

    fn assertion_with_scopes(scopes: &[String], private_pem: &str) -> String {
        sign(
            &json!({
                "prn": "alice",
                "sub": "alice",
                "iss": "test-app-id",
                "aud": IDP_ISSUER,
                "iat": now(),
                "exp": now() + 600,
                "scopes": scopes,
            }),
            private_pem,
        )
    }

    struct FakeSecrets {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SecretSource for FakeSecrets {
        async fn fetch(&self, reference: &str) -> Result<String, SecretError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match reference {
                CLIENT_SECRET_REF => Ok("sekret".to_string()),
                ASSERTER_KEY_REF => Ok(test_keys::RSA_PUBLIC_KEY_PEM.to_string()),
                other => Err(SecretError::NotFound(other.to_string())),
            }
        }
    }

    /// Issues access tokens the way the identity provider would: a gateway
    /// scope request yields a gateway-audience token, anything else a
    /// downstream-audience one, granting exactly the requested scope.
    struct FakeExchanger {
        calls: AtomicUsize,
        requested_scopes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TokenExchanger for FakeExchanger {
        async fn exchange_user_assertion(
            &self,
            _assertion: &str,
            scope: &str,
            _client_secret: &str,
        ) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested_scopes.lock().unwrap().push(scope.to_string());

            let audience = if scope == gateway_scope() {
                GATEWAY_AUDIENCE
            } else {
                DOWNSTREAM_AUDIENCE
            };
            Ok(sign(
                &json!({
                    "sub": "alice",
                    "aud": audience,
                    "iat": now(),
                    "exp": now() + 900,
                    "scope": scope,
                }),
                test_keys::RSA_PRIVATE_KEY_PEM,
            ))
        }
    }

    struct FakeKeys {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeyResolver for FakeKeys {
        async fn resolve(&self, _token: &str) -> Result<DecodingKey, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DecodingKey::from_rsa_pem(test_keys::RSA_PUBLIC_KEY_PEM.as_bytes()).unwrap())
        }
    }

    struct FakeAsserter {
        calls: AtomicUsize,
        requested_scopes: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl AssertionProvider for FakeAsserter {
        async fn delegated_assertion(
            &self,
            username: &str,
            scopes: &[String],
        ) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested_scopes.lock().unwrap().push(scopes.to_vec());

            Ok(sign(
                &json!({
                    "prn": username,
                    "sub": username,
                    "iss": "test-app-id",
                    "aud": "https://identity.example.com/",
                    "iat": now(),
                    "exp": now() + 1800,
                }),
                test_keys::RSA_PRIVATE_KEY_PEM,
            ))
        }
    }

    struct Harness {
        service: AuthorizeService,
        secrets: Arc<FakeSecrets>,
        keys: Arc<FakeKeys>,
        exchanger: Arc<FakeExchanger>,
        asserter: Arc<FakeAsserter>,
    }

    impl Harness {
        fn network_calls(&self) -> usize {
            self.secrets.calls.load(Ordering::SeqCst)
                + self.keys.calls.load(Ordering::SeqCst)
                + self.exchanger.calls.load(Ordering::SeqCst)
                + self.asserter.calls.load(Ordering::SeqCst)
        }
    }

    fn harness(delegate_downstream_scopes: bool) -> Harness {
        let secrets = Arc::new(FakeSecrets {
            calls: AtomicUsize::new(0),
        });
        let keys = Arc::new(FakeKeys {
            calls: AtomicUsize::new(0),
        });
        let exchanger = Arc::new(FakeExchanger {
            calls: AtomicUsize::new(0),
            requested_scopes: Mutex::new(Vec::new()),
        });
        let asserter = Arc::new(FakeAsserter {
            calls: AtomicUsize::new(0),
            requested_scopes: Mutex::new(Vec::new()),
        });

        let service = AuthorizeService {
            idp_issuer: IDP_ISSUER.to_string(),
            client_secret_ref: CLIENT_SECRET_REF.to_string(),
            asserter_public_key_ref: ASSERTER_KEY_REF.to_string(),
            gateway_audience: GATEWAY_AUDIENCE.to_string(),
            downstream_audience: DOWNSTREAM_AUDIENCE.to_string(),
            delegate_downstream_scopes,
            secrets: secrets.clone(),
            keys: keys.clone(),
            exchanger: exchanger.clone(),
            asserter: asserter.clone(),
        };

        Harness {
            service,
            secrets,
            keys,
            exchanger,
            asserter,
        }
    }

    #[tokio::test]
    async fn empty_scopes_deny_without_any_network_call() {
        let h = harness(false);
        let token = assertion_with_scopes(&[], test_keys::RSA_PRIVATE_KEY_PEM);

        let err = h.service.authorize(&token).await.unwrap_err();

        assert!(matches!(err, AppError::NoScopesRequested));
        assert_eq!(h.network_calls(), 0);
    }

    #[tokio::test]
    async fn missing_gateway_scope_denies_before_any_network_call() {
        let h = harness(false);
        let token = assertion_with_scopes(
            &["custom.read".to_string()],
            test_keys::RSA_PRIVATE_KEY_PEM,
        );

        let err = h.service.authorize(&token).await.unwrap_err();

        assert!(matches!(err, AppError::GatewayScopeMissing));
        assert_eq!(h.network_calls(), 0);
    }

    #[tokio::test]
    async fn gateway_only_scope_exchanges_once_and_answers_from_the_gateway_token() {
        let h = harness(false);
        let token = assertion_with_scopes(&[gateway_scope()], test_keys::RSA_PRIVATE_KEY_PEM);

        let auth = h.service.authorize(&token).await.unwrap();

        assert_eq!(h.exchanger.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.asserter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(auth.principal, "alice");
        // The response scope is the gateway token's scope claim, split.
        assert_eq!(auth.scope, vec![gateway_scope()]);
        assert!(auth.access_token.is_none());
        assert!(auth.expires_at > chrono::Utc::now());
    }

    #[tokio::test]
    async fn remaining_scopes_trigger_a_second_exchange_with_a_delegated_assertion() {
        let h = harness(false);
        let token = assertion_with_scopes(
            &[gateway_scope(), "custom.read".to_string()],
            test_keys::RSA_PRIVATE_KEY_PEM,
        );

        let auth = h.service.authorize(&token).await.unwrap();

        assert_eq!(h.exchanger.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.asserter.calls.load(Ordering::SeqCst), 1);

        // The gateway scope was consumed exactly once: the downstream
        // exchange only carries what remained.
        let requested = h.exchanger.requested_scopes.lock().unwrap().clone();
        assert_eq!(requested, vec![gateway_scope(), "custom.read".to_string()]);

        assert_eq!(auth.scope, vec!["custom.read"]);
        let downstream = auth.access_token.expect("downstream token forwarded");
        let claims = verifier::decode_unverified(&downstream).unwrap();
        assert_eq!(claims.granted_scopes(), vec!["custom.read"]);
    }

    #[tokio::test]
    async fn multiple_remaining_scopes_join_into_one_exchange() {
        let h = harness(false);
        let token = assertion_with_scopes(
            &[
                gateway_scope(),
                "custom.read".to_string(),
                "custom.write".to_string(),
            ],
            test_keys::RSA_PRIVATE_KEY_PEM,
        );

        let auth = h.service.authorize(&token).await.unwrap();

        // One call for the group, not one per scope.
        assert_eq!(h.exchanger.calls.load(Ordering::SeqCst), 2);
        let requested = h.exchanger.requested_scopes.lock().unwrap().clone();
        assert_eq!(requested[1], "custom.read custom.write");
        assert_eq!(auth.scope, vec!["custom.read", "custom.write"]);
    }

    #[tokio::test]
    async fn delegated_assertion_requests_empty_scopes_by_default() {
        let h = harness(false);
        let token = assertion_with_scopes(
            &[gateway_scope(), "custom.read".to_string()],
            test_keys::RSA_PRIVATE_KEY_PEM,
        );

        h.service.authorize(&token).await.unwrap();

        let asserter_scopes = h.asserter.requested_scopes.lock().unwrap().clone();
        assert_eq!(asserter_scopes, vec![Vec::<String>::new()]);
    }

    #[tokio::test]
    async fn delegated_assertion_carries_scopes_when_configured() {
        let h = harness(true);
        let token = assertion_with_scopes(
            &[gateway_scope(), "custom.read".to_string()],
            test_keys::RSA_PRIVATE_KEY_PEM,
        );

        h.service.authorize(&token).await.unwrap();

        let asserter_scopes = h.asserter.requested_scopes.lock().unwrap().clone();
        assert_eq!(asserter_scopes, vec![vec!["custom.read".to_string()]]);
    }

    #[tokio::test]
    async fn tampered_signature_denies_before_any_exchange() {
        let h = harness(false);
        let token = assertion_with_scopes(
            &[gateway_scope()],
            test_keys::OTHER_RSA_PRIVATE_KEY_PEM,
        );

        let err = h.service.authorize(&token).await.unwrap_err();

        assert!(matches!(err, AppError::SignatureInvalid));
        assert_eq!(h.exchanger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn assertion_bound_to_a_foreign_audience_denies() {
        let h = harness(false);
        // Right key, wrong audience: the double binding rejects it.
        let token = sign(
            &json!({
                "prn": "alice",
                "aud": "https://somewhere-else.example.com",
                "iat": now(),
                "exp": now() + 600,
                "scopes": [gateway_scope()],
            }),
            test_keys::RSA_PRIVATE_KEY_PEM,
        );

        let err = h.service.authorize(&token).await.unwrap_err();

        assert!(matches!(err, AppError::AudienceMismatch));
        assert_eq!(h.exchanger.calls.load(Ordering::SeqCst), 0);
    }
}
