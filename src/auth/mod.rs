pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::types::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        let expiry_hours = config::config().security.jwt_expiry_hours;
        Self::with_expiry(user_id, role, Duration::hours(expiry_hours as i64))
    }

    pub fn with_expiry(user_id: Uuid, role: Role, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT secret not configured")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid or expired token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    encode_with_secret(claims, &config::config().security.jwt_secret)
}

pub fn validate_jwt(token: &str) -> Result<Claims, JwtError> {
    decode_with_secret(token, &config::config().security.jwt_secret)
}

fn encode_with_secret(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

fn decode_with_secret(token: &str, secret: &str) -> Result<Claims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(JwtError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_preserves_claims() {
        let user_id = Uuid::new_v4();
        let claims = Claims::with_expiry(user_id, Role::TechnicalManager, Duration::hours(1));
        let token = encode_with_secret(&claims, "test-secret").unwrap();

        let decoded = decode_with_secret(&token, "test-secret").unwrap();
        assert_eq!(decoded.sub, user_id);
        assert_eq!(decoded.role, Role::TechnicalManager);
        assert_eq!(decoded.exp, claims.exp);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let claims = Claims::with_expiry(Uuid::new_v4(), Role::Engineer, Duration::hours(1));
        let token = encode_with_secret(&claims, "one").unwrap();
        assert!(matches!(decode_with_secret(&token, "two"), Err(JwtError::InvalidToken(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims::with_expiry(Uuid::new_v4(), Role::Admin, Duration::hours(-2));
        let token = encode_with_secret(&claims, "test-secret").unwrap();
        assert!(decode_with_secret(&token, "test-secret").is_err());
    }

    #[test]
    fn empty_secret_refuses_to_sign() {
        let claims = Claims::with_expiry(Uuid::new_v4(), Role::Admin, Duration::hours(1));
        assert!(matches!(encode_with_secret(&claims, ""), Err(JwtError::InvalidSecret)));
    }
}
