//! Dashboard session tokens: HS256, 24-hour expiry, `user_id` + `email`
//! claims. No JWKS or external OIDC validation; Lumina only ever issues
//! and verifies its own symmetric tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token encode/decode failure: {0}")]
    Jsonwebtoken(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub email: String,
    pub exp: i64,
}

pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionTokens {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, JwtError> {
        let claims = SessionClaims {
            user_id,
            email: email.to_string(),
            exp: (Utc::now() + Duration::hours(SESSION_TTL_HOURS)).timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, JwtError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_back_to_the_same_claims() {
        let tokens = SessionTokens::new("test-secret-value-long-enough");
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id, "a@example.com").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.email, "a@example.com");
    }

    #[test]
    fn tampered_token_fails_verification() {
        let tokens = SessionTokens::new("test-secret-value-long-enough");
        let mut token = tokens.issue(Uuid::new_v4(), "a@example.com").unwrap();
        token.push('x');
        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let a = SessionTokens::new("secret-a-long-enough-for-hs256");
        let b = SessionTokens::new("secret-b-long-enough-for-hs256");
        let token = a.issue(Uuid::new_v4(), "a@example.com").unwrap();
        assert!(b.verify(&token).is_err());
    }
}
