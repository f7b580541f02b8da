//! Bearer tokens: issued by Auth on login, verified by Order on purchase.

use chrono::{Duration, Utc};
use common::AggregateId;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const TOKEN_DURATION_SECS: i64 = 24 * 3600;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Token subject is not a user id: {0}")]
    BadSubject(String),
}

/// JWT claims. `unique_name` holds the user's aggregate id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub unique_name: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

pub trait TokenIssuer: Send + Sync + 'static {
    fn issue(&self, user_id: AggregateId) -> Result<String, TokenError>;
}

pub trait TokenVerifier: Send + Sync + 'static {
    /// Returns the user id carried by a valid, unexpired token.
    fn user_id(&self, token: &str) -> Result<AggregateId, TokenError>;
}

/// HS256 issuer and verifier sharing one secret.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        }
    }
}

impl TokenIssuer for JwtService {
    fn issue(&self, user_id: AggregateId) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            unique_name: user_id.to_string(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(TOKEN_DURATION_SECS)).timestamp(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }
}

impl TokenVerifier for JwtService {
    fn user_id(&self, token: &str) -> Result<AggregateId, TokenError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;
        let uuid = Uuid::parse_str(&claims.unique_name)
            .map_err(|_| TokenError::BadSubject(claims.unique_name.clone()))?;

        Ok(AggregateId::from_uuid(uuid))
    }
}
