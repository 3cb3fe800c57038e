//! Delegated-assertion collaborator.
//!
//! The asserter is a separate service; all the orchestrator needs from it is
//! "mint a fresh assertion for this principal".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::error::AppError;

#[async_trait]
pub trait AssertionProvider: Send + Sync {
    async fn delegated_assertion(
        &self,
        username: &str,
        scopes: &[String],
    ) -> Result<String, AppError>;
}

#[derive(Debug, Serialize)]
struct AssertionRequestBody<'a> {
    username: &'a str,
    seconds: u64,
    scopes: &'a [String],
    #[serde(rename = "api-key", skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AssertionResponseBody {
    #[serde(default)]
    assertion: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the assertion-issuing service.
pub struct AsserterClient {
    http: reqwest::Client,
    endpoint: Url,
    ttl_seconds: u64,
    api_key: Option<String>,
}

impl AsserterClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: Url,
        ttl_seconds: u64,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            endpoint,
            ttl_seconds,
            api_key,
        }
    }
}

#[async_trait]
impl AssertionProvider for AsserterClient {
    async fn delegated_assertion(
        &self,
        username: &str,
        scopes: &[String],
    ) -> Result<String, AppError> {
        let body = AssertionRequestBody {
            username,
            seconds: self.ttl_seconds,
            scopes,
            api_key: self.api_key.as_deref(),
        };

        debug!(username, scope_count = scopes.len(), "requesting delegated assertion");

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "asserter unreachable");
                AppError::DownstreamAssertion("asserter unreachable".to_string())
            })?;

        let status = resp.status();
        let parsed: AssertionResponseBody = resp.json().await.map_err(|e| {
            error!(status = status.as_u16(), error = %e, "asserter response unreadable");
            AppError::DownstreamAssertion("asserter response unreadable".to_string())
        })?;

        match (status.is_success(), parsed.assertion) {
            (true, Some(assertion)) => Ok(assertion),
            _ => {
                let reason = parsed
                    .error
                    .unwrap_or_else(|| format!("asserter returned {status}"));
                error!(status = status.as_u16(), reason = %reason, "asserter refused to issue");
                Err(AppError::DownstreamAssertion(reason))
            }
        }
    }
}
