//! Error types for the monitoring API

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

use crate::auth::AuthError;
use crate::gateway::GatewayError;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Alias, cluster or service does not resolve
    NotFound(String),

    /// A remote gateway call failed
    Upstream(String),

    /// Missing, malformed or expired credentials
    Unauthorized(String),

    /// Authenticated but not allowed
    Forbidden(String),

    /// Identity already exists
    Conflict(String),

    /// Request could not be processed as sent
    BadRequest(String),

    /// Configuration error
    Config(String),

    /// IO operation failed
    Io(std::io::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Generic error with message
    Internal(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "{}", msg),
            ApiError::Upstream(msg) => write!(f, "{}", msg),
            ApiError::Unauthorized(msg) => write!(f, "{}", msg),
            ApiError::Forbidden(msg) => write!(f, "{}", msg),
            ApiError::Conflict(msg) => write!(f, "{}", msg),
            ApiError::BadRequest(msg) => write!(f, "{}", msg),
            ApiError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ApiError::Io(err) => write!(f, "IO error: {}", err),
            ApiError::Json(err) => write!(f, "JSON error: {}", err),
            ApiError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Io(err) => Some(err),
            ApiError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_)
            | ApiError::Config(_)
            | ApiError::Io(_)
            | ApiError::Json(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Only client-facing kinds carry their message; local faults stay opaque.
        let detail = match self {
            ApiError::Config(_) | ApiError::Io(_) | ApiError::Json(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({ "detail": detail }))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Io(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Json(err)
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(_: actix_web::error::BlockingError) -> Self {
        ApiError::Internal("Internal server error".to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::Unauthorized("Not authenticated".to_string()),
            AuthError::Expired => ApiError::Unauthorized("Token has expired".to_string()),
            AuthError::InvalidToken(_) => {
                ApiError::Unauthorized("Could not validate credentials".to_string())
            }
            AuthError::UserNotFound => ApiError::Unauthorized("User not found".to_string()),
            AuthError::InvalidCredentials | AuthError::Inactive => {
                ApiError::Unauthorized("Invalid username or password".to_string())
            }
            AuthError::Forbidden => ApiError::Forbidden("Not enough permissions".to_string()),
            AuthError::AlreadyExists => ApiError::Conflict("Username already exists".to_string()),
            AuthError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AuthError::Crypto(_) | AuthError::Store(_) => {
                ApiError::Internal("Internal server error".to_string())
            }
        }
    }
}
