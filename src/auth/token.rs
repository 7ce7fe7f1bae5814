//! Bearer token validation.
//!
//! Tokens are HMAC-SHA signed JWTs (`HS256`, `HS384` or `HS512`) checked
//! against a pre-shared secret. The gateway only *validates* tokens; issuing
//! them is the user service's job.
//!
//! Validation rules:
//!
//! - well-formed `header.claims.signature` structure
//! - signature matches the configured secret
//! - `exp` and `nbf`, when present, hold with zero leeway
//! - `sub` is present and non-empty
//!
//! Token contents are never logged.

use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

/// Minimum secret length in bytes (256 bits, the HS256 key size).
pub const MIN_SECRET_BYTES: usize = 32;

/// Identity extracted from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The token's `sub` claim.
    pub subject: String,
}

/// Why a token was rejected.
///
/// Callers must not surface the reason to clients; every variant maps to
/// the same 401.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token has no subject")]
    MissingSubject,
}

impl TokenError {
    /// Short label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::NotYetValid => "not_yet_valid",
            TokenError::MissingSubject => "missing_subject",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// Pre-compiled validator with a cached decoding key.
///
/// Cheap to clone and safe to share across tasks: the key is read-only.
#[derive(Clone)]
pub struct TokenValidator {
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
}

impl TokenValidator {
    /// Create a validator from the shared secret.
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;

        Self {
            decoding_key: Arc::new(DecodingKey::from_secret(
                secret.expose_secret().as_bytes(),
            )),
            validation,
        }
    }

    /// Validate `token` and return its subject.
    pub fn validate(&self, token: &str) -> Result<Identity, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                _ => TokenError::Malformed,
            }
        })?;

        match data.claims.sub {
            Some(subject) if !subject.is_empty() => Ok(Identity { subject }),
            _ => Err(TokenError::MissingSubject),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;

    const SECRET: &str = "test_secret_key_minimum_32_chars!";

    fn validator() -> TokenValidator {
        TokenValidator::new(&SecretString::from(SECRET))
    }

    fn sign(claims: serde_json::Value, alg: Algorithm, secret: &str) -> String {
        encode(
            &Header::new(alg),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_one_hour() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_valid_token_yields_subject() {
        let token = sign(json!({"sub": "alice", "exp": in_one_hour()}), Algorithm::HS256, SECRET);
        assert_eq!(validator().validate(&token).unwrap().subject, "alice");
    }

    #[test]
    fn test_hs512_accepted() {
        let token = sign(json!({"sub": "svc-billing"}), Algorithm::HS512, SECRET);
        assert_eq!(validator().validate(&token).unwrap().subject, "svc-billing");
    }

    #[test]
    fn test_validation_is_idempotent() {
        let v = validator();
        let token = sign(json!({"sub": "alice", "exp": in_one_hour()}), Algorithm::HS256, SECRET);

        let first = v.validate(&token).unwrap();
        let second = v.validate(&token).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_expired_token_rejected() {
        let exp = Utc::now().timestamp() - 10;
        let token = sign(json!({"sub": "alice", "exp": exp}), Algorithm::HS256, SECRET);
        assert_eq!(validator().validate(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_not_yet_valid_token_rejected() {
        let nbf = Utc::now().timestamp() + 600;
        let token = sign(json!({"sub": "alice", "nbf": nbf}), Algorithm::HS256, SECRET);
        assert_eq!(validator().validate(&token), Err(TokenError::NotYetValid));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(
            json!({"sub": "alice"}),
            Algorithm::HS256,
            "another_secret_key_of_32_bytes_min!!",
        );
        assert_eq!(
            validator().validate(&token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_garbage_rejected() {
        let v = validator();
        assert_eq!(v.validate("garbage"), Err(TokenError::Malformed));
        assert_eq!(v.validate("invalid.token.here"), Err(TokenError::Malformed));
        assert_eq!(v.validate(""), Err(TokenError::Malformed));
    }

    #[test]
    fn test_missing_subject_rejected() {
        let token = sign(json!({"exp": in_one_hour()}), Algorithm::HS256, SECRET);
        assert_eq!(validator().validate(&token), Err(TokenError::MissingSubject));

        let token = sign(json!({"sub": ""}), Algorithm::HS256, SECRET);
        assert_eq!(validator().validate(&token), Err(TokenError::MissingSubject));
    }
}
