//! Request-scoped detail document for a single service. Never touches the cache.

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

use crate::errors::{ApiError, Result};
use crate::gateway::{
    GatewayError, MetricWindow, MetricsGateway, RawContainer, RawDeployment, RawScalingActivity,
    RawScalingPolicy, RawService, RawTask, RawTaskDefinition,
};
use crate::models::detail::{
    AutoScalingConfig, ContainerInfo, CurrentDeployment, CurrentTasks, DeploymentHistoryEntry,
    DeploymentInfo, LoadBalancerSection, NetworkConfig, ScalingEvent, ScalingPolicyInfo,
    ServiceConfiguration, ServiceDefinition, ServiceDetails, ServiceEvent, ServiceEvents,
    ServiceOverview, TaskDefinitionInfo, TaskInfo,
};
use crate::models::snapshot::normalize_history;
use crate::services::collector::metric_pair;

const DEPLOYMENT_HISTORY_LIMIT: usize = 5;
const SERVICE_EVENT_LIMIT: usize = 10;
const DEFAULT_MIN_CAPACITY: i64 = 1;
const DEFAULT_MAX_CAPACITY: i64 = 10;

/// Assemble the detail document for `service` in `cluster`
#[instrument(skip(gateway))]
pub async fn fetch_service_details(
    gateway: &dyn MetricsGateway,
    profile: &str,
    cluster: &str,
    service_name: &str,
) -> Result<ServiceDetails> {
    let now = Utc::now();

    let service = gateway
        .describe_service(profile, cluster, service_name)
        .await
        .map_err(fetch_error)?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Service {} not found in cluster {}",
                service_name, cluster
            ))
        })?;

    let task_definition_id = service.task_definition.clone().unwrap_or_default();
    let (task_definition, task_ids, activities, history, policies) = futures::join!(
        gateway.describe_task_definition(profile, cluster, &task_definition_id),
        gateway.list_tasks(profile, cluster, service_name),
        gateway.scaling_activities(profile, cluster, service_name),
        metric_pair(gateway, profile, cluster, service_name, MetricWindow::HISTORY),
        gateway.scaling_policies(profile, cluster, service_name),
    );

    let task_definition = task_definition.map_err(fetch_error)?;
    let task_ids = task_ids.map_err(fetch_error)?;
    let activities = activities.map_err(fetch_error)?;
    let policies = policies.unwrap_or_else(|e| {
        warn!("Scaling policy lookup for {}/{} failed: {}", cluster, service_name, e);
        Vec::new()
    });

    let tasks = if task_ids.is_empty() {
        Vec::new()
    } else {
        gateway
            .describe_tasks(profile, cluster, &task_ids)
            .await
            .map_err(fetch_error)?
    };

    let (cpu, memory) = history;
    Ok(ServiceDetails {
        service_overview: service_overview(
            &service,
            normalize_history(&cpu),
            normalize_history(&memory),
            now,
        ),
        deployment_info: deployment_info(&service.deployments, now),
        current_tasks: current_tasks(&service, &tasks, &task_definition, now),
        events: service_events(&service, &activities, now),
        configuration: service_configuration(&service, &policies),
    })
}

fn fetch_error(err: GatewayError) -> ApiError {
    ApiError::Upstream(format!("Error fetching service details: {}", err))
}

fn timestamp(value: Option<DateTime<Utc>>, fallback: DateTime<Utc>) -> String {
    value.unwrap_or(fallback).to_rfc3339()
}

/// Last `/`-separated segment of an identifier, empty when absent
fn short_id(identifier: Option<&str>) -> String {
    identifier
        .and_then(|id| id.rsplit('/').next())
        .unwrap_or_default()
        .to_string()
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn text_or(value: &Option<String>, fallback: &str) -> String {
    value.clone().unwrap_or_else(|| fallback.to_string())
}

pub fn service_overview(
    service: &RawService,
    historical_cpu: Vec<f64>,
    historical_memory: Vec<f64>,
    now: DateTime<Utc>,
) -> ServiceOverview {
    ServiceOverview {
        service_arn: text(&service.service_arn),
        creation_date: timestamp(service.created_at, now),
        task_definition: text(&service.task_definition),
        desired_count: service.desired_count.unwrap_or(0),
        launch_type: text_or(&service.launch_type, "UNKNOWN"),
        platform_version: text_or(&service.platform_version, "LATEST"),
        status: text_or(&service.status, "UNKNOWN"),
        historical_cpu,
        historical_memory,
    }
}

pub fn deployment_info(deployments: &[RawDeployment], now: DateTime<Utc>) -> DeploymentInfo {
    let primary = deployments
        .iter()
        .find(|d| d.status.as_deref() == Some("PRIMARY"))
        .cloned()
        .unwrap_or_default();

    DeploymentInfo {
        current_deployment: CurrentDeployment {
            id: text(&primary.id),
            status: text(&primary.status),
            created_at: timestamp(primary.created_at, now),
            updated_at: timestamp(primary.updated_at, now),
            task_definition: text(&primary.task_definition),
            rollout_progress: primary.rollout_completed_percent.unwrap_or(0.0),
            running_count: primary.running_count.unwrap_or(0),
            desired_count: primary.desired_count.unwrap_or(0),
        },
        deployment_history: deployments
            .iter()
            .take(DEPLOYMENT_HISTORY_LIMIT)
            .map(|d| DeploymentHistoryEntry {
                id: text(&d.id),
                status: text(&d.status),
                task_definition: text(&d.task_definition),
                created_at: timestamp(d.created_at, now),
                completed_at: timestamp(d.updated_at, now),
            })
            .collect(),
    }
}

pub fn current_tasks(
    service: &RawService,
    tasks: &[RawTask],
    task_definition: &RawTaskDefinition,
    now: DateTime<Utc>,
) -> CurrentTasks {
    let definition = TaskDefinitionInfo {
        family: text(&task_definition.family),
        revision: task_definition.revision.unwrap_or(0),
        containers: task_definition.containers.iter().map(container_info).collect(),
    };

    CurrentTasks {
        running_count: service.running_count.unwrap_or(0),
        desired_count: service.desired_count.unwrap_or(0),
        tasks: tasks
            .iter()
            .map(|task| TaskInfo {
                task_id: short_id(task.task_arn.as_deref()),
                health_status: text_or(&task.health_status, "UNKNOWN"),
                started_at: timestamp(task.started_at, now),
                container_instance: short_id(task.container_instance_arn.as_deref()),
                availability_zone: text(&task.availability_zone),
                task_definition: definition.clone(),
            })
            .collect(),
    }
}

fn container_info(container: &RawContainer) -> ContainerInfo {
    ContainerInfo {
        name: text(&container.name),
        image: text(&container.image),
        cpu: container.cpu.unwrap_or(0),
        memory: container.memory.unwrap_or(0),
        essential: container.essential.unwrap_or(false),
        port_mappings: container.port_mappings.clone(),
    }
}

pub fn service_events(
    service: &RawService,
    activities: &[RawScalingActivity],
    now: DateTime<Utc>,
) -> ServiceEvents {
    ServiceEvents {
        service_events: service
            .events
            .iter()
            .take(SERVICE_EVENT_LIMIT)
            .map(|event| ServiceEvent {
                event_type: "INFO".to_string(),
                message: text(&event.message),
                timestamp: timestamp(event.created_at, now),
            })
            .collect(),
        scaling_events: activities
            .iter()
            .map(|activity| ScalingEvent {
                activity_id: text(&activity.activity_id),
                start_time: activity
                    .start_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                description: text(&activity.description),
                status_code: text(&activity.status_code),
                cause: text(&activity.cause),
                reason: activity.not_scaled_reasons.first().cloned(),
            })
            .collect(),
    }
}

pub fn service_configuration(service: &RawService, policies: &[RawScalingPolicy]) -> ServiceConfiguration {
    let load_balancer = match service.load_balancers.first() {
        Some(lb) => LoadBalancerSection::Attached {
            balancer_type: "NETWORK".to_string(),
            target_group_arn: text(&lb.target_group_arn),
            config: lb.clone(),
        },
        None => LoadBalancerSection::Detached {},
    };

    let network = match &service.network {
        Some(network) => NetworkConfig {
            network_mode: "awsvpc".to_string(),
            assign_public_ip: network.assign_public_ip.as_deref() == Some("ENABLED"),
            subnets: network.subnets.clone(),
            security_groups: network.security_groups.clone(),
        },
        None => NetworkConfig {
            network_mode: "bridge".to_string(),
            assign_public_ip: false,
            subnets: Vec::new(),
            security_groups: Vec::new(),
        },
    };

    ServiceConfiguration {
        service_definition: ServiceDefinition {
            service_name: text(&service.service_name),
            task_definition: text(&service.task_definition),
            desired_count: service.desired_count.unwrap_or(0),
            launch_type: text(&service.launch_type),
            platform_version: text_or(&service.platform_version, "LATEST"),
            deployment_configuration: service
                .deployment_configuration
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
        },
        load_balancer,
        auto_scaling: auto_scaling(policies),
        network,
    }
}

fn auto_scaling(policies: &[RawScalingPolicy]) -> AutoScalingConfig {
    AutoScalingConfig {
        min_capacity: policies
            .iter()
            .find_map(|p| p.min_capacity)
            .unwrap_or(DEFAULT_MIN_CAPACITY),
        max_capacity: policies
            .iter()
            .find_map(|p| p.max_capacity)
            .unwrap_or(DEFAULT_MAX_CAPACITY),
        status: if policies.is_empty() { "DISABLED" } else { "ENABLED" }.to_string(),
        policies: policies
            .iter()
            .map(|p| ScalingPolicyInfo {
                name: text(&p.policy_name),
                policy_type: text(&p.policy_type),
                target_value: p.target_value.unwrap_or(0.0),
            })
            .collect(),
    }
}
