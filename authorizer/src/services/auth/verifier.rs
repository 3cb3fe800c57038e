//! Token decode and validation.
//!
//! Two entry points: `decode_claims` checks signature, expiration and
//! audience against a resolved key; `decode_unverified` only reads the
//! payload, for the scope classification that happens before the applicable
//! key and audience are known.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use tracing::warn;

use crate::error::AppError;
use crate::services::auth::claims::TokenClaims;

/// Clock skew tolerated between the token issuers and this host.
const LEEWAY_SECONDS: u64 = 60;

/// Decode a token and validate signature, expiration and audience.
pub fn decode_claims(
    token: &str,
    key: &DecodingKey,
    expected_audience: &str,
) -> Result<TokenClaims, AppError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[expected_audience]);
    validation.leeway = LEEWAY_SECONDS;

    let data =
        jsonwebtoken::decode::<TokenClaims>(token, key, &validation).map_err(map_jwt_error)?;

    Ok(data.claims)
}

/// Decode a token's payload without trusting it.
///
/// The token must still be a well-formed, unexpired JWT; nothing read here is
/// trusted until `decode_claims` has run against a real key.
pub fn decode_unverified(token: &str) -> Result<TokenClaims, AppError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AppError::MalformedInput(
            "token is not a three-part JWT".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AppError::MalformedInput("token payload is not base64url".to_string()))?;
    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|_| AppError::MalformedInput("token payload is not a claims object".to_string()))?;

    let now = chrono::Utc::now().timestamp().max(0) as u64;
    if claims.exp.saturating_add(LEEWAY_SECONDS) < now {
        return Err(AppError::TokenExpired);
    }

    Ok(claims)
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AppError {
    use jsonwebtoken::errors::ErrorKind;

    warn!(error = %e, "token validation failed");
    match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        ErrorKind::InvalidAudience => AppError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim.as_str() == "aud" => {
            AppError::AudienceMismatch
        }
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => {
            AppError::MalformedInput("token is not a well-formed JWT".to_string())
        }
        _ => AppError::SignatureInvalid,
    }
}
