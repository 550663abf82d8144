use actix_web::{Responder, web};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub async fn health_check() -> impl Responder {
    web::Json(HealthResponse { status: "ok" })
}
