use std::net::SocketAddr;
use std::str::FromStr;
use std::{env, fmt};

use crate::error::AppError;

/// Every assertion names the identity provider itself as audience; the
/// provider only accepts user assertions addressed to this value.
pub const IDP_AUDIENCE: &str = "https://identity.oraclecloud.com/";

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

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    /// Application identity at the identity provider; becomes the `iss` claim.
    pub idp_client_id: String,
    // Assertions are signed with this private key
    pub signing_key_pem: String,
    /// `kid` header stamped on every assertion, matching the certificate
    /// uploaded to the identity provider.
    pub signing_key_id: String,
    /// When set, callers must present exactly this key.
    pub required_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("ASSERTER_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4001);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("ASSERTER_PORT"))?;

        let app_env = AppEnv::from_env();

        let idp_client_id =
            env::var("IDP_CLIENT_ID").map_err(|_| ConfigError::Missing("IDP_CLIENT_ID"))?;
        let signing_key_pem = env::var("ASSERTER_PRIVATE_KEY_PEM")
            .map_err(|_| ConfigError::Missing("ASSERTER_PRIVATE_KEY_PEM"))?
            .replace("\\n", "\n");
        let signing_key_id =
            env::var("SIGNING_KEY_ID").unwrap_or_else(|_| "agcert2".to_string());
        let required_api_key = env::var("VALID_API_KEY").ok();

        Ok(Config {
            addr,
            app_env,
            idp_client_id,
            signing_key_pem,
            signing_key_id,
            required_api_key,
        })
    }
}

impl From<ConfigError> for AppError {
    fn from(_: ConfigError) -> Self {
        AppError::Internal
    }
}
