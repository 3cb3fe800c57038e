use serde::Deserialize;

/// Claims carried by user assertions and identity-provider access tokens.
///
/// One structure covers both shapes: assertions carry `prn`/`scopes`, access
/// tokens carry `scope` as a space-separated string. Signature, expiration
/// and audience checks happen in the verifier against the raw token, not
/// here.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub prn: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,

    pub exp: u64,
    #[serde(default)]
    pub iat: Option<u64>,

    /// Scopes requested by a user assertion.
    #[serde(default)]
    pub scopes: Option<Vec<String>>,

    /// Scopes granted by an access token (space-separated on the wire).
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenClaims {
    /// `prn`, with `sub` as the fallback.
    pub fn principal(&self) -> Option<&str> {
        self.prn.as_deref().or(self.sub.as_deref())
    }

    /// Scopes requested by a user assertion. An absent claim reads as empty.
    pub fn requested_scopes(&self) -> Vec<String> {
        self.scopes.clone().unwrap_or_default()
    }

    /// Scopes granted by an access token, split from the wire format.
    pub fn granted_scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_owned)
            .collect()
    }
}
