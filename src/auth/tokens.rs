use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::AuthError;
use super::models::{Role, UserResponse};

pub const ACCESS_TOKEN_TYPE: &str = "access";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Username
    pub sub: String,
    pub user_id: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Freshly signed token together with its lifetime
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub max_age_seconds: i64,
}

/// Signs and verifies session tokens with a shared HMAC secret
pub struct JwtHandler {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtHandler {
    pub fn new(secret: &str, algorithm: &str) -> Result<Self, AuthError> {
        let algorithm = Algorithm::from_str(algorithm)
            .map_err(|e| AuthError::Crypto(format!("unsupported JWT algorithm {}: {}", algorithm, e)))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AuthError::Crypto(format!(
                "JWT algorithm {:?} needs a key pair, only HMAC algorithms are supported",
                algorithm
            )));
        }

        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    /// Issue a token for `user` valid for its role's session lifetime
    pub fn issue(&self, user: &UserResponse, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let lifetime = user.role.session_lifetime();
        let expires_at = now + lifetime;
        let claims = Claims {
            sub: user.username.clone(),
            user_id: user.id.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at,
            max_age_seconds: lifetime.num_seconds(),
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::InvalidToken(format!("unexpected token type {}", claims.token_type)));
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for JwtHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtHandler")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
