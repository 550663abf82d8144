use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;

use crate::errors::Result;
use crate::services::TriggerOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AliasQuery {
    pub alias: String,
}

// Kick off an on-demand refresh and return immediately
pub async fn trigger_refresh(data: web::Data<AppState>, query: web::Query<AliasQuery>) -> Result<HttpResponse> {
    let alias = query.into_inner().alias;

    let message = match data.coordinator.trigger(&alias)? {
        TriggerOutcome::Started => format!("Refresh triggered for alias '{}'", alias),
        TriggerOutcome::AlreadyInProgress => format!("Refresh already in progress for alias '{}'", alias),
    };

    Ok(HttpResponse::Ok().json(json!({ "message": message })))
}

pub async fn refresh_status(data: web::Data<AppState>, query: web::Query<AliasQuery>) -> Result<HttpResponse> {
    let report = data.coordinator.report(&query.alias)?;
    Ok(HttpResponse::Ok().json(report))
}
