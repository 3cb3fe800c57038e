use chrono::SecondsFormat;
use serde::Serialize;

use crate::services::auth::authorize_service::Authorization;

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeResponse {
    /// Always a genuine boolean, also on the gateway-only path.
    pub active: bool,
    pub principal: String,
    pub scope: Vec<String>,
    #[serde(rename = "expiresAt")]
    pub expires_at: String,

    /// Extra context for the gateway (header injection). Present only when a
    /// downstream access token must be forwarded to the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<AccessContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessContext {
    pub access_token: String,
}

impl From<Authorization> for AuthorizeResponse {
    fn from(auth: Authorization) -> Self {
        Self {
            active: true,
            principal: auth.principal,
            scope: auth.scope,
            expires_at: auth.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            context: auth
                .access_token
                .map(|access_token| AccessContext { access_token }),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn simple_response_omits_context_and_keeps_active_boolean() {
        let auth = Authorization {
            principal: "alice".to_string(),
            scope: vec!["urn:opc:resource:consumer::all".to_string()],
            expires_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            access_token: None,
        };

        let json = serde_json::to_value(AuthorizeResponse::from(auth)).unwrap();

        assert_eq!(json["active"], serde_json::Value::Bool(true));
        assert_eq!(json["principal"], "alice");
        assert_eq!(json["expiresAt"], "2023-11-14T22:13:20Z");
        assert!(json.get("context").is_none());
    }

    #[test]
    fn delegated_response_carries_the_access_token() {
        let auth = Authorization {
            principal: "alice".to_string(),
            scope: vec!["custom.read".to_string()],
            expires_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            access_token: Some("downstream-token".to_string()),
        };

        let json = serde_json::to_value(AuthorizeResponse::from(auth)).unwrap();

        assert_eq!(json["context"]["access_token"], "downstream-token");
        assert_eq!(json["scope"][0], "custom.read");
    }
}
