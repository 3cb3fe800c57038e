//! Identity-provider token exchange.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::error::AppError;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Exchange a user assertion for a scoped access token.
///
/// Exactly one scope string per call; scope groups are pre-joined with
/// spaces by the caller.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_user_assertion(
        &self,
        assertion: &str,
        scope: &str,
        client_secret: &str,
    ) -> Result<String, AppError>;
}

#[derive(Debug, Serialize)]
struct ExchangeForm<'a> {
    grant_type: &'static str,
    assertion: &'a str,
    scope: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Client for the identity provider's token endpoint.
pub struct IdpClient {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
}

impl IdpClient {
    pub fn new(http: reqwest::Client, token_url: Url, client_id: String) -> Self {
        Self {
            http,
            token_url,
            client_id,
        }
    }
}

#[async_trait]
impl TokenExchanger for IdpClient {
    async fn exchange_user_assertion(
        &self,
        assertion: &str,
        scope: &str,
        client_secret: &str,
    ) -> Result<String, AppError> {
        let form = ExchangeForm {
            grant_type: JWT_BEARER_GRANT,
            assertion,
            scope,
        };

        let resp = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "token exchange request failed");
                AppError::Exchange("identity provider unreachable".to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            // The body goes to the logs only; the caller sees a plain deny.
            let body = resp.text().await.unwrap_or_default();
            error!(
                status = status.as_u16(),
                body = %body,
                scope,
                "identity provider rejected the exchange"
            );
            return Err(AppError::Exchange(format!(
                "identity provider returned {status}"
            )));
        }

        let token: TokenResponse = resp.json().await.map_err(|e| {
            error!(error = %e, "token response unreadable");
            AppError::Exchange("token response unreadable".to_string())
        })?;

        debug!(
            token_type = token.token_type.as_deref().unwrap_or("Bearer"),
            expires_in = token.expires_in,
            scope,
            "access token obtained"
        );

        Ok(token.access_token)
    }
}
