//! Request extractors enforcing a valid session on handlers that name them

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, web};
use std::future::{Ready, ready};

use super::models::{Role, UserResponse};
use super::tokens::Claims;
use super::{AuthError, AuthService, SESSION_COOKIE};
use crate::errors::ApiError;

/// Verified token claims. Looks at the session cookie first, then the bearer header.
#[derive(Debug, Clone)]
pub struct SessionClaims(pub Claims);

/// Verified token plus the user record it names. Looks at the bearer header
/// first, then the session cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: UserResponse,
    pub claims: Claims,
}

/// A [`CurrentUser`] holding the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub UserResponse);

fn auth_service(req: &HttpRequest) -> Result<&AuthService, ApiError> {
    req.app_data::<web::Data<AuthService>>()
        .map(|data| data.get_ref())
        .ok_or_else(|| ApiError::Internal("Authentication is not configured".to_string()))
}

fn cookie_token(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim().to_string()).filter(|token| !token.is_empty())
}

fn session_claims(req: &HttpRequest) -> Result<SessionClaims, ApiError> {
    let auth = auth_service(req)?;
    let token = cookie_token(req)
        .or_else(|| bearer_token(req))
        .ok_or(AuthError::MissingCredentials)?;

    Ok(SessionClaims(auth.verify_token(&token)?))
}

fn current_user(req: &HttpRequest) -> Result<CurrentUser, ApiError> {
    let auth = auth_service(req)?;
    let token = bearer_token(req)
        .or_else(|| cookie_token(req))
        .ok_or(AuthError::MissingCredentials)?;

    let claims = auth.verify_token(&token)?;
    let user = auth.get_user_by_username(&claims.sub)?;
    Ok(CurrentUser { user, claims })
}

impl FromRequest for SessionClaims {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(session_claims(req))
    }
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(current_user(req))
    }
}

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(current_user(req).and_then(|current| {
            if current.user.role == Role::Admin {
                Ok(AdminUser(current.user))
            } else {
                Err(AuthError::Forbidden.into())
            }
        }))
    }
}
