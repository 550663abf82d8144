use actix_web::{HttpResponse, web};
use serde::Deserialize;
use tracing::info;

use crate::auth::SessionClaims;
use crate::errors::{ApiError, Result};
use crate::services::details::fetch_service_details;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClustersQuery {
    pub alias: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceDetailsQuery {
    pub service_name: String,
    pub cluster_name: String,
    pub alias: String,
}

// Configured alias names, in document order
pub async fn list_aliases(_session: SessionClaims, data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.aliases.aliases())
}

// Cached snapshots of one alias, or of every alias when none is given
pub async fn get_clusters(
    _session: SessionClaims,
    data: web::Data<AppState>,
    query: web::Query<ClustersQuery>,
) -> Result<HttpResponse> {
    match query.into_inner().alias.filter(|a| !a.is_empty()) {
        Some(alias) => {
            if !data.aliases.contains(&alias) {
                return Err(ApiError::NotFound(format!("Alias {} not found", alias)));
            }
            let snapshots = data.cache.get(&alias);
            info!("Returning {} cached services for alias {}", snapshots.len(), alias);
            Ok(HttpResponse::Ok().json(snapshots.as_ref()))
        }
        None => {
            let snapshots = data.cache.get_all();
            info!("Returning {} cached services across all aliases", snapshots.len());
            Ok(HttpResponse::Ok().json(snapshots))
        }
    }
}

// Live detail document for one service, bypassing the cache
pub async fn get_service_details(
    _session: SessionClaims,
    data: web::Data<AppState>,
    query: web::Query<ServiceDetailsQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let profile = data.profile(&query.alias)?;
    info!(
        "Request for details of service {} in cluster {} (alias {})",
        query.service_name, query.cluster_name, query.alias
    );

    let details = fetch_service_details(
        data.gateway.as_ref(),
        profile,
        &query.cluster_name,
        &query.service_name,
    )
    .await?;

    Ok(HttpResponse::Ok().json(details))
}
