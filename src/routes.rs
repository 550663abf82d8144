use actix_web::web;

use crate::auth;
use crate::controllers::{clusters, health, refresh};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check))
        .route("/aliases", web::get().to(clusters::list_aliases))
        .route("/clusters", web::get().to(clusters::get_clusters))
        .route("/service-details", web::get().to(clusters::get_service_details))
        .route("/refresh", web::get().to(refresh::trigger_refresh))
        .route("/refresh-status", web::get().to(refresh::refresh_status))
        .configure(auth::routes::configure);
}
