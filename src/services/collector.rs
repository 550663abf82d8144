//! Fetch-and-reshape routine producing one alias's service snapshots

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::gateway::{GatewayResult, MetricKind, MetricWindow, MetricsGateway, RawService};
use crate::models::snapshot::normalize_history;
use crate::models::ServiceSnapshot;

/// Historical series are only sampled for services running at least this many tasks
pub const HISTORY_MIN_RUNNING_TASKS: u32 = 2;

/// Collect snapshots for every service of every cluster reachable through `profile`.
///
/// Listing failures abort the whole collection. Metric failures only zero
/// out the affected values.
#[instrument(skip(gateway, collected_at))]
pub async fn collect_alias(
    gateway: &dyn MetricsGateway,
    alias: &str,
    profile: &str,
    collected_at: DateTime<Utc>,
) -> GatewayResult<Vec<ServiceSnapshot>> {
    let last_updated = collected_at.to_rfc3339();
    let clusters = gateway.list_clusters(profile).await?;
    let mut snapshots = Vec::new();

    for cluster in clusters {
        let services = gateway.list_services(profile, &cluster).await?;
        if services.is_empty() {
            continue;
        }

        for service in services {
            let Some(service_name) = service.service_name.clone().filter(|n| !n.is_empty()) else {
                warn!("Skipping unnamed service in cluster {} of alias {}", cluster, alias);
                continue;
            };

            let running_tasks = running_tasks(&service);
            let (current_cpu, current_memory) =
                metric_pair(gateway, profile, &cluster, &service_name, MetricWindow::CURRENT).await;

            let (historical_cpu, historical_memory) = if running_tasks >= HISTORY_MIN_RUNNING_TASKS {
                let (cpu, memory) =
                    metric_pair(gateway, profile, &cluster, &service_name, MetricWindow::HISTORY).await;
                (normalize_history(&cpu), normalize_history(&memory))
            } else {
                (Vec::new(), Vec::new())
            };

            snapshots.push(ServiceSnapshot {
                account_alias: alias.to_string(),
                cluster_name: cluster.clone(),
                service_name,
                running_tasks,
                current_cpu: current_cpu.first().copied().unwrap_or(0.0),
                current_memory: current_memory.first().copied().unwrap_or(0.0),
                historical_cpu,
                historical_memory,
                last_updated: last_updated.clone(),
            });
        }
    }

    debug!("Collected {} snapshots for alias {}", snapshots.len(), alias);
    Ok(snapshots)
}

/// CPU and memory series for one service. Each side falls back to empty on failure.
pub async fn metric_pair(
    gateway: &dyn MetricsGateway,
    profile: &str,
    cluster: &str,
    service: &str,
    window: MetricWindow,
) -> (Vec<f64>, Vec<f64>) {
    let (cpu, memory) = futures::join!(
        gateway.metric_series(profile, cluster, service, MetricKind::Cpu, window),
        gateway.metric_series(profile, cluster, service, MetricKind::Memory, window),
    );

    let settle = |kind: MetricKind, result: GatewayResult<Vec<f64>>| {
        result.unwrap_or_else(|e| {
            warn!("{} query for {}/{} failed: {}", kind, cluster, service, e);
            Vec::new()
        })
    };

    (settle(MetricKind::Cpu, cpu), settle(MetricKind::Memory, memory))
}

fn running_tasks(service: &RawService) -> u32 {
    service
        .running_count
        .map(|count| u32::try_from(count.max(0)).unwrap_or(u32::MAX))
        .unwrap_or(0)
}
