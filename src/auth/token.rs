//! Signed bearer tokens carrying an account id and expiry.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Verification outcome for a rejected token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Signature failure, malformed payload, or missing fields.
    #[error("invalid token")]
    Invalid,
    /// Valid signature but `now >= expires_at`.
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// HS256 codec over a single process-wide secret.
///
/// Expiry is evaluated against the instant the caller read from its clock,
/// not the codec's own idea of time, so the strict `now >= exp` rule is
/// testable and consistent with the rest of the core.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: chrono::Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl,
        }
    }

    /// Issue a token for `account_id` valid from `now` for the configured TTL.
    ///
    /// # Errors
    /// Returns an error if claim serialization fails.
    pub fn issue(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).context("failed to sign token")
    }

    /// Verify a presented token and return the account id it carries.
    ///
    /// # Errors
    /// `Invalid` for signature/shape problems, `Expired` once `now` has
    /// reached the embedded expiry.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, TokenError> {
        // Expiry is checked below against the caller's clock instant.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| TokenError::Invalid)?;

        if now.timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(&SecretString::from("test-secret"), Duration::days(7))
    }

    #[test]
    fn round_trip_within_ttl() -> Result<()> {
        let codec = codec();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let token = codec.issue(id, now)?;
        assert_eq!(codec.verify(&token, now + Duration::days(6)), Ok(id));
        Ok(())
    }

    #[test]
    fn expired_at_and_after_ttl() -> Result<()> {
        let codec = codec();
        let now = Utc::now();
        let token = codec.issue(Uuid::new_v4(), now)?;
        // Strict comparison: the expiry instant itself is already rejected.
        assert_eq!(
            codec.verify(&token, now + Duration::days(7)),
            Err(TokenError::Expired)
        );
        assert_eq!(
            codec.verify(&token, now + Duration::days(30)),
            Err(TokenError::Expired)
        );
        Ok(())
    }

    #[test]
    fn tampering_any_byte_invalidates() -> Result<()> {
        let codec = codec();
        let now = Utc::now();
        let token = codec.issue(Uuid::new_v4(), now)?;

        let mut bytes = token.into_bytes();
        let middle = bytes.len() / 2;
        bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).expect("ascii token");

        assert_eq!(codec.verify(&tampered, now), Err(TokenError::Invalid));
        Ok(())
    }

    #[test]
    fn malformed_and_wrong_secret_are_invalid() -> Result<()> {
        let codec = codec();
        let now = Utc::now();
        assert_eq!(codec.verify("not-a-token", now), Err(TokenError::Invalid));
        assert_eq!(codec.verify("", now), Err(TokenError::Invalid));

        let other = TokenCodec::new(&SecretString::from("other-secret"), Duration::days(7));
        let token = other.issue(Uuid::new_v4(), now)?;
        assert_eq!(codec.verify(&token, now), Err(TokenError::Invalid));
        Ok(())
    }
}
