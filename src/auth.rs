//! Handshake credential verification.
//!
//! Every WebSocket connection attempt carries a bearer token in the
//! `?token=` query parameter (browsers can't set headers on WebSocket
//! upgrades). The token is an HS256 JWT; [`verify`] decodes it against the
//! configured signing secret before the upgrade is allowed to complete.
//!
//! Verification is a pure function: same token + same secret → same outcome.
//! The token itself is consumed here and never stored.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a handshake credential was refused.
///
/// The display strings are a compatibility contract with the web client,
/// which matches on them to decide between "log in" and "session expired"
/// flows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token was presented at all.
    #[error("Autenticación requerida")]
    Missing,
    /// A token was presented but failed signature or expiry validation.
    #[error("Token inválido")]
    Invalid,
}

/// Decoded identity claim carried by a verified token.
///
/// Owned by the session that produced it; immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier of the authenticated user.
    pub sub: String,
    /// Expiry as epoch seconds.
    pub exp: u64,
}

/// Verify a bearer token and extract its identity claim.
///
/// `None` or an empty string is [`AuthError::Missing`]; a present token that
/// fails HS256 signature or expiry validation is [`AuthError::Invalid`].
pub fn verify(token: Option<&str>, secret: &str) -> Result<Claims, AuthError> {
    let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::Missing)?;
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    match decode::<Claims>(token, &key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => {
            tracing::debug!(error = %e, "token rejected");
            Err(AuthError::Invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn make_token(sub: &str, exp: u64, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> u64 {
        crate::util::now_ms() / 1000 + 3600
    }

    #[test]
    fn valid_token_yields_claims() {
        let token = make_token("u1", future_exp(), SECRET);
        let claims = verify(Some(&token), SECRET).unwrap();
        assert_eq!(claims.sub, "u1");
    }

    #[test]
    fn missing_token_is_missing() {
        assert_eq!(verify(None, SECRET).unwrap_err(), AuthError::Missing);
        assert_eq!(verify(Some(""), SECRET).unwrap_err(), AuthError::Missing);
    }

    #[test]
    fn garbage_token_is_invalid() {
        assert_eq!(
            verify(Some("not-a-jwt"), SECRET).unwrap_err(),
            AuthError::Invalid
        );
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = make_token("u1", future_exp(), "other-secret");
        assert_eq!(verify(Some(&token), SECRET).unwrap_err(), AuthError::Invalid);
    }

    #[test]
    fn expired_token_is_invalid() {
        // Past the default 60s validation leeway
        let exp = crate::util::now_ms() / 1000 - 3600;
        let token = make_token("u1", exp, SECRET);
        assert_eq!(verify(Some(&token), SECRET).unwrap_err(), AuthError::Invalid);
    }

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(AuthError::Missing.to_string(), "Autenticación requerida");
        assert_eq!(AuthError::Invalid.to_string(), "Token inválido");
    }
}
