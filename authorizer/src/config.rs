use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use std::{env, fmt};

use url::Url;

use crate::error::AppError;

/// Path suffix appended to the gateway audience to form the scope reserved
/// for the gateway's own self-check.
pub const GATEWAY_SCOPE_SUFFIX: &str = "/apigw";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Where secret references are resolved.
#[derive(Clone, Debug)]
pub enum SecretsBackend {
    /// References are environment variable names (development).
    Env,
    /// References are looked up as base64 bundles at a vault endpoint.
    Vault { endpoint: Url },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    // Identity provider
    pub idp_client_id: String,
    /// Reference to the client secret, never the literal value.
    pub idp_client_secret_ref: String,
    pub idp_issuer: String,
    pub idp_token_url: Url,
    pub idp_jwks_url: Url,

    /// Reference to the asserter's public key, used to verify inbound assertions.
    pub asserter_public_key_ref: String,

    // Audiences
    pub gateway_audience: String,
    pub downstream_audience: String,

    // Delegated assertion issuance
    pub asserter_endpoint: Url,
    pub asserter_api_key: Option<String>,
    pub delegated_assertion_ttl_seconds: u64,
    /// Whether the delegated assertion itself carries the downstream scopes.
    pub delegate_downstream_scopes: bool,

    pub secrets_backend: SecretsBackend,
    pub outbound_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = env::var("AUTHORIZER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("AUTHORIZER_PORT"))?;

        let app_env = AppEnv::from_env();

        let idp_client_id =
            env::var("IDP_CLIENT_ID").map_err(|_| ConfigError::Missing("IDP_CLIENT_ID"))?;
        let idp_client_secret_ref = env::var("IDP_CLIENT_SECRET_REF")
            .map_err(|_| ConfigError::Missing("IDP_CLIENT_SECRET_REF"))?;
        let idp_issuer =
            env::var("IDP_ISSUER").map_err(|_| ConfigError::Missing("IDP_ISSUER"))?;

        // IDCS-style endpoint layout, overridable where deployments differ.
        let idp_token_url = match env::var("IDP_TOKEN_URL") {
            Ok(v) => Url::parse(&v).map_err(|_| ConfigError::Invalid("IDP_TOKEN_URL"))?,
            Err(_) => Url::parse(&format!(
                "{}/oauth2/v1/token",
                idp_issuer.trim_end_matches('/')
            ))
            .map_err(|_| ConfigError::Invalid("IDP_ISSUER"))?,
        };
        let idp_jwks_url = match env::var("IDP_JWKS_URL") {
            Ok(v) => Url::parse(&v).map_err(|_| ConfigError::Invalid("IDP_JWKS_URL"))?,
            Err(_) => Url::parse(&format!(
                "{}/admin/v1/SigningCert/jwk",
                idp_issuer.trim_end_matches('/')
            ))
            .map_err(|_| ConfigError::Invalid("IDP_ISSUER"))?,
        };

        let asserter_public_key_ref = env::var("ASSERTER_PUBLIC_KEY_REF")
            .map_err(|_| ConfigError::Missing("ASSERTER_PUBLIC_KEY_REF"))?;

        let gateway_audience =
            env::var("GATEWAY_AUDIENCE").map_err(|_| ConfigError::Missing("GATEWAY_AUDIENCE"))?;
        let downstream_audience = env::var("DOWNSTREAM_AUDIENCE")
            .map_err(|_| ConfigError::Missing("DOWNSTREAM_AUDIENCE"))?;

        let asserter_endpoint = Url::parse(
            &env::var("ASSERTER_ENDPOINT")
                .map_err(|_| ConfigError::Missing("ASSERTER_ENDPOINT"))?,
        )
        .map_err(|_| ConfigError::Invalid("ASSERTER_ENDPOINT"))?;
        let asserter_api_key = env::var("ASSERTER_API_KEY").ok();

        let delegated_assertion_ttl_seconds = env::var("DELEGATED_ASSERTION_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1800); // 30 min
        let delegate_downstream_scopes = env::var("DELEGATE_DOWNSTREAM_SCOPES")
            .is_ok_and(|v| v.eq_ignore_ascii_case("true"));

        let secrets_backend = match env::var("SECRETS_BACKEND").ok().as_deref() {
            Some("vault") => {
                let endpoint = Url::parse(
                    &env::var("VAULT_ENDPOINT")
                        .map_err(|_| ConfigError::Missing("VAULT_ENDPOINT"))?,
                )
                .map_err(|_| ConfigError::Invalid("VAULT_ENDPOINT"))?;
                SecretsBackend::Vault { endpoint }
            }
            _ => SecretsBackend::Env,
        };

        let outbound_timeout = Duration::from_secs(
            env::var("OUTBOUND_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        );

        Ok(Config {
            addr,
            app_env,
            idp_client_id,
            idp_client_secret_ref,
            idp_issuer,
            idp_token_url,
            idp_jwks_url,
            asserter_public_key_ref,
            gateway_audience,
            downstream_audience,
            asserter_endpoint,
            asserter_api_key,
            delegated_assertion_ttl_seconds,
            delegate_downstream_scopes,
            secrets_backend,
            outbound_timeout,
        })
    }
}

impl From<ConfigError> for AppError {
    fn from(_: ConfigError) -> Self {
        AppError::Internal
    }
}
