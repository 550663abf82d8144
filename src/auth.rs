//! Username/password session layer: credential table, password hashing,
//! email encryption and signed session tokens carried by cookie or bearer header.

pub mod crypto;
pub mod extract;
pub mod models;
pub mod routes;
pub mod service;
pub mod store;
pub mod tokens;

use std::fmt;

pub use extract::{AdminUser, CurrentUser, SessionClaims};
pub use models::Role;
pub use service::AuthService;

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session_token";

#[derive(Debug)]
pub enum AuthError {
    /// Neither a cookie nor a bearer header was sent
    MissingCredentials,

    /// Token signature is valid but the token is past its expiry
    Expired,

    /// Token could not be decoded or verified
    InvalidToken(String),

    /// Token subject has no record in the credential table
    UserNotFound,

    /// Unknown username or wrong password
    InvalidCredentials,

    /// Account exists but is deactivated
    Inactive,

    /// Authenticated user lacks the required role
    Forbidden,

    /// Username is already taken
    AlreadyExists,

    /// Submitted user data is unusable
    InvalidInput(String),

    /// Hashing, encryption or signing failed
    Crypto(String),

    /// Credential table could not be read or written
    Store(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "no credentials supplied"),
            AuthError::Expired => write!(f, "token has expired"),
            AuthError::InvalidToken(msg) => write!(f, "invalid token: {}", msg),
            AuthError::UserNotFound => write!(f, "user not found"),
            AuthError::InvalidCredentials => write!(f, "invalid username or password"),
            AuthError::Inactive => write!(f, "account is deactivated"),
            AuthError::Forbidden => write!(f, "not enough permissions"),
            AuthError::AlreadyExists => write!(f, "username already exists"),
            AuthError::InvalidInput(msg) => write!(f, "{}", msg),
            AuthError::Crypto(msg) => write!(f, "crypto error: {}", msg),
            AuthError::Store(msg) => write!(f, "credential store error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::InvalidToken(err.to_string()),
        }
    }
}
