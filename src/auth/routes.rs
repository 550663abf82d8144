use actix_web::cookie::{Cookie, SameSite, time};
use actix_web::{HttpResponse, web};
use tracing::info;

use super::models::{LoginResponse, MessageResponse, SessionResponse, UserCreate, UserLogin};
use super::{AdminUser, AuthService, CurrentUser, SESSION_COOKIE};
use crate::errors::Result;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/session", web::get().to(session))
            .route("/create-user", web::post().to(create_user))
            .route("/me", web::get().to(me))
            .route("/health", web::get().to(health)),
    );
}

fn session_cookie(token: String, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .max_age(time::Duration::seconds(max_age_seconds))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .finish()
}

// Exchange a username and password for a session cookie and bearer token
async fn login(auth: web::Data<AuthService>, credentials: web::Json<UserLogin>) -> Result<HttpResponse> {
    let credentials = credentials.into_inner();
    let service = auth.clone();
    let user = web::block(move || {
        service.authenticate_user(&credentials.username, &credentials.password)
    })
    .await??;
    let issued = auth.issue_token(&user)?;
    info!("User {} logged in, session valid until {}", user.username, issued.expires_at);

    let cookie = session_cookie(issued.token.clone(), issued.max_age_seconds, auth.cookie_secure());
    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        message: "Login successful".to_string(),
        user,
        access_token: issued.token,
        token_type: "bearer".to_string(),
    }))
}

async fn logout(auth: web::Data<AuthService>) -> HttpResponse {
    let mut cookie = session_cookie(String::new(), 0, auth.cookie_secure());
    cookie.make_removal();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(MessageResponse::new("Logout successful"))
}

async fn session(current: CurrentUser) -> HttpResponse {
    let expires_at = current
        .claims
        .expires_at()
        .map(|at| at.to_rfc3339())
        .unwrap_or_default();

    HttpResponse::Ok().json(SessionResponse {
        user: current.user,
        expires_at,
        is_valid: true,
    })
}

// Admin-only account creation
async fn create_user(
    admin: AdminUser,
    auth: web::Data<AuthService>,
    user: web::Json<UserCreate>,
) -> Result<HttpResponse> {
    info!("Admin {} creating user {}", admin.0.username, user.username);
    let user = user.into_inner();
    let created = web::block(move || auth.create_user(user)).await??;
    Ok(HttpResponse::Ok().json(created))
}

async fn me(current: CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(current.user)
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "authentication"
    }))
}
