//! Kubernetes control plane adapter.
//!
//! Mapping onto the gateway vocabulary:
//! profile = kubeconfig context, cluster = namespace, service = Deployment,
//! task definition = the revisioned ReplicaSet's pod template, task = Pod,
//! scaling policy / activity = the same-named HorizontalPodAutoscaler and its events.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Container, Event, Namespace, Pod, Service};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams};
use kube::config::{Config as KubeConfig, KubeConfigOptions};
use kube::Client;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    GatewayError, GatewayResult, MetricKind, MetricWindow, MetricsGateway, PrometheusClient,
    RawContainer, RawDeployment, RawLoadBalancer, RawPortMapping, RawScalingActivity,
    RawScalingPolicy, RawService, RawServiceEvent, RawTask, RawTaskDefinition,
};

const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";
const ZONE_LABEL: &str = "topology.kubernetes.io/zone";

/// Gateway backed by the Kubernetes API and a Prometheus-compatible metrics service
pub struct KubernetesGateway {
    metrics: PrometheusClient,
    clients: RwLock<HashMap<String, Client>>,
}

impl KubernetesGateway {
    pub fn new(metrics: PrometheusClient) -> Self {
        Self {
            metrics,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Client for a kubeconfig context, built once and reused
    async fn client(&self, profile: &str) -> GatewayResult<Client> {
        if let Some(client) = self.clients.read().await.get(profile) {
            return Ok(client.clone());
        }

        let options = KubeConfigOptions {
            context: Some(profile.to_string()),
            cluster: None,
            user: None,
        };
        let config = KubeConfig::from_kubeconfig(&options)
            .await
            .map_err(|e| GatewayError::Kubeconfig(format!("context '{}': {}", profile, e)))?;
        let client = Client::try_from(config)?;

        info!("Connected control plane client for profile {}", profile);
        self.clients
            .write()
            .await
            .insert(profile.to_string(), client.clone());
        Ok(client)
    }

    async fn deployment(&self, client: Client, namespace: &str, name: &str) -> GatewayResult<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(client, namespace);
        Ok(api.get_opt(name).await?)
    }

    /// ReplicaSets owned by a Deployment, newest revision first
    async fn owned_replica_sets(
        &self,
        client: Client,
        namespace: &str,
        deployment: &Deployment,
    ) -> GatewayResult<Vec<ReplicaSet>> {
        let api: Api<ReplicaSet> = Api::namespaced(client, namespace);
        let params = match selector_string(deployment) {
            Some(selector) => ListParams::default().labels(&selector),
            None => ListParams::default(),
        };
        let uid = deployment.metadata.uid.clone().unwrap_or_default();

        let mut owned: Vec<ReplicaSet> = api
            .list(&params)
            .await?
            .items
            .into_iter()
            .filter(|rs| {
                rs.metadata
                    .owner_references
                    .as_ref()
                    .is_some_and(|owners| owners.iter().any(|o| o.uid == uid))
            })
            .collect();

        owned.sort_by_key(|rs| std::cmp::Reverse(revision(&rs.metadata.annotations)));
        Ok(owned)
    }

    async fn events_for(
        &self,
        client: Client,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> GatewayResult<Vec<Event>> {
        let api: Api<Event> = Api::namespaced(client, namespace);
        let params = ListParams::default().fields(&format!(
            "involvedObject.kind={},involvedObject.name={}",
            kind, name
        ));

        let mut events = api.list(&params).await?.items;
        events.sort_by_key(|e| std::cmp::Reverse(event_time(e)));
        Ok(events)
    }

    async fn load_balancers(&self, client: Client, namespace: &str, name: &str) -> Vec<RawLoadBalancer> {
        let api: Api<Service> = Api::namespaced(client, namespace);
        let service = match api.get_opt(name).await {
            Ok(Some(service)) => service,
            Ok(None) => return Vec::new(),
            Err(e) => {
                debug!("Load balancer lookup for {}/{} failed: {}", namespace, name, e);
                return Vec::new();
            }
        };

        let Some(spec) = service.spec else {
            return Vec::new();
        };
        if spec.type_.as_deref() != Some("LoadBalancer") {
            return Vec::new();
        }

        spec.ports
            .unwrap_or_default()
            .into_iter()
            .map(|port| RawLoadBalancer {
                target_group_arn: Some(format!("service/{}/{}", namespace, name)),
                load_balancer_name: Some(name.to_string()),
                container_name: port.name,
                container_port: Some(i64::from(port.port)),
            })
            .collect()
    }

    async fn node_zone(&self, client: Client, node: &str) -> Option<String> {
        let api: Api<k8s_openapi::api::core::v1::Node> = Api::all(client);
        let node = api.get_opt(node).await.ok().flatten()?;
        node.metadata.labels?.get(ZONE_LABEL).cloned()
    }
}

#[async_trait]
impl MetricsGateway for KubernetesGateway {
    async fn list_clusters(&self, profile: &str) -> GatewayResult<Vec<String>> {
        let client = self.client(profile).await?;
        let api: Api<Namespace> = Api::all(client);

        Ok(api
            .list(&ListParams::default())
            .await?
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn list_services(&self, profile: &str, cluster: &str) -> GatewayResult<Vec<RawService>> {
        let client = self.client(profile).await?;
        let api: Api<Deployment> = Api::namespaced(client, cluster);

        Ok(api
            .list(&ListParams::default())
            .await?
            .items
            .iter()
            .map(|deployment| service_record(profile, cluster, deployment))
            .collect())
    }

    async fn describe_service(
        &self,
        profile: &str,
        cluster: &str,
        service: &str,
    ) -> GatewayResult<Option<RawService>> {
        let client = self.client(profile).await?;
        let Some(deployment) = self.deployment(client.clone(), cluster, service).await? else {
            return Ok(None);
        };

        let mut record = service_record(profile, cluster, &deployment);
        let replica_sets = self
            .owned_replica_sets(client.clone(), cluster, &deployment)
            .await?;
        let current_revision = revision(&deployment.metadata.annotations);

        record.deployments = replica_sets
            .iter()
            .map(|rs| rollout_record(service, rs, current_revision))
            .collect();
        record.events = self
            .events_for(client.clone(), cluster, "Deployment", service)
            .await?
            .iter()
            .map(|event| RawServiceEvent {
                message: event.message.clone(),
                created_at: event_time(event),
            })
            .collect();
        record.load_balancers = self.load_balancers(client, cluster, service).await;

        Ok(Some(record))
    }

    async fn describe_task_definition(
        &self,
        profile: &str,
        cluster: &str,
        task_definition: &str,
    ) -> GatewayResult<RawTaskDefinition> {
        let (family, wanted) = split_task_definition(task_definition);
        let client = self.client(profile).await?;
        let deployment = self
            .deployment(client.clone(), cluster, family)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("Task definition {} not found", task_definition)))?;

        let replica_sets = self.owned_replica_sets(client, cluster, &deployment).await?;
        let template = replica_sets
            .iter()
            .find(|rs| wanted.is_none() || revision(&rs.metadata.annotations) == wanted)
            .and_then(|rs| rs.spec.as_ref())
            .and_then(|spec| spec.template.clone())
            .or_else(|| deployment.spec.as_ref().map(|spec| spec.template.clone()));

        let containers = template
            .and_then(|t| t.spec)
            .map(|pod| pod.containers.iter().map(container_record).collect())
            .unwrap_or_default();

        Ok(RawTaskDefinition {
            family: Some(family.to_string()),
            revision: wanted.or(revision(&deployment.metadata.annotations)),
            containers,
        })
    }

    async fn list_tasks(&self, profile: &str, cluster: &str, service: &str) -> GatewayResult<Vec<String>> {
        let client = self.client(profile).await?;
        let Some(deployment) = self.deployment(client.clone(), cluster, service).await? else {
            return Ok(Vec::new());
        };
        let Some(selector) = selector_string(&deployment) else {
            return Ok(Vec::new());
        };

        let api: Api<Pod> = Api::namespaced(client, cluster);
        let params = ListParams::default()
            .labels(&selector)
            .fields("status.phase=Running");

        Ok(api
            .list(&params)
            .await?
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }

    async fn describe_tasks(
        &self,
        profile: &str,
        cluster: &str,
        task_ids: &[String],
    ) -> GatewayResult<Vec<RawTask>> {
        let client = self.client(profile).await?;
        let api: Api<Pod> = Api::namespaced(client.clone(), cluster);
        let mut zones: HashMap<String, Option<String>> = HashMap::new();
        let mut tasks = Vec::with_capacity(task_ids.len());

        for id in task_ids {
            let Some(pod) = api.get_opt(id).await? else {
                continue;
            };

            let node = pod.spec.as_ref().and_then(|spec| spec.node_name.clone());
            let zone = match &node {
                Some(node) => match zones.get(node) {
                    Some(zone) => zone.clone(),
                    None => {
                        let zone = self.node_zone(client.clone(), node).await;
                        zones.insert(node.clone(), zone.clone());
                        zone
                    }
                },
                None => None,
            };

            tasks.push(RawTask {
                task_arn: Some(format!("pod/{}/{}", cluster, id)),
                health_status: pod.status.as_ref().map(pod_health),
                started_at: pod
                    .status
                    .as_ref()
                    .and_then(|status| status.start_time.as_ref())
                    .map(|time| time.0),
                container_instance_arn: node.map(|node| format!("node/{}", node)),
                availability_zone: zone,
            });
        }

        Ok(tasks)
    }

    async fn scaling_activities(
        &self,
        profile: &str,
        cluster: &str,
        service: &str,
    ) -> GatewayResult<Vec<RawScalingActivity>> {
        let client = self.client(profile).await?;
        let events = self
            .events_for(client, cluster, "HorizontalPodAutoscaler", service)
            .await?;

        Ok(events
            .into_iter()
            .map(|event| {
                let failed = event.type_.as_deref() == Some("Warning");
                let reason = event.reason.clone();
                RawScalingActivity {
                    activity_id: event.metadata.uid.clone(),
                    start_time: event_time(&event),
                    description: event.message.clone(),
                    status_code: Some(if failed { "Failed" } else { "Successful" }.to_string()),
                    cause: reason.clone(),
                    not_scaled_reasons: if failed { reason.into_iter().collect() } else { Vec::new() },
                }
            })
            .collect())
    }

    async fn scaling_policies(
        &self,
        profile: &str,
        cluster: &str,
        service: &str,
    ) -> GatewayResult<Vec<RawScalingPolicy>> {
        let client = self.client(profile).await?;
        let api: Api<HorizontalPodAutoscaler> = Api::namespaced(client, cluster);
        let Some(hpa) = api.get_opt(service).await? else {
            return Ok(Vec::new());
        };
        let Some(spec) = hpa.spec else {
            return Ok(Vec::new());
        };

        let min_capacity = spec.min_replicas.map(i64::from);
        let max_capacity = Some(i64::from(spec.max_replicas));

        Ok(spec
            .metrics
            .unwrap_or_default()
            .into_iter()
            .filter_map(|metric| {
                let resource = metric.resource?;
                Some(RawScalingPolicy {
                    policy_name: Some(format!("{}-{}", service, resource.name)),
                    policy_type: Some("TargetTrackingScaling".to_string()),
                    target_value: resource.target.average_utilization.map(f64::from),
                    min_capacity,
                    max_capacity,
                })
            })
            .collect())
    }

    async fn metric_series(
        &self,
        _profile: &str,
        cluster: &str,
        service: &str,
        metric: MetricKind,
        window: MetricWindow,
    ) -> GatewayResult<Vec<f64>> {
        self.metrics.utilization(cluster, service, metric, window).await
    }
}

fn service_record(profile: &str, namespace: &str, deployment: &Deployment) -> RawService {
    let name = deployment.metadata.name.clone().unwrap_or_default();
    let spec = deployment.spec.as_ref();
    let status = deployment.status.as_ref();
    let revision = revision(&deployment.metadata.annotations);

    RawService {
        service_arn: Some(format!("{}/{}/deployments/{}", profile, namespace, name)),
        service_name: Some(name.clone()),
        status: Some(deployment_status(deployment).to_string()),
        task_definition: Some(match revision {
            Some(revision) => format!("{}:{}", name, revision),
            None => name.clone(),
        }),
        desired_count: spec.and_then(|s| s.replicas).map(i64::from),
        running_count: status.and_then(|s| s.ready_replicas).map(i64::from),
        launch_type: Some("KUBERNETES".to_string()),
        platform_version: None,
        created_at: deployment.metadata.creation_timestamp.as_ref().map(|t| t.0),
        deployments: Vec::new(),
        events: Vec::new(),
        load_balancers: Vec::new(),
        network: None,
        deployment_configuration: spec
            .and_then(|s| s.strategy.as_ref())
            .and_then(|strategy| serde_json::to_value(strategy).ok()),
    }
}

fn rollout_record(service: &str, rs: &ReplicaSet, current_revision: Option<i64>) -> RawDeployment {
    let rs_revision = revision(&rs.metadata.annotations);
    let desired = rs.spec.as_ref().and_then(|s| s.replicas).map(i64::from);
    let ready = rs.status.as_ref().and_then(|s| s.ready_replicas).map(i64::from);
    let progress = match (desired, ready) {
        (Some(desired), Some(ready)) if desired > 0 => Some((ready as f64 / desired as f64 * 100.0).min(100.0)),
        (Some(0), _) => Some(100.0),
        _ => None,
    };

    RawDeployment {
        id: rs.metadata.name.clone(),
        status: Some(if rs_revision.is_some() && rs_revision == current_revision {
            "PRIMARY".to_string()
        } else {
            "INACTIVE".to_string()
        }),
        task_definition: Some(match rs_revision {
            Some(revision) => format!("{}:{}", service, revision),
            None => service.to_string(),
        }),
        created_at: rs.metadata.creation_timestamp.as_ref().map(|t| t.0),
        updated_at: None,
        rollout_completed_percent: progress,
        running_count: ready,
        desired_count: desired,
    }
}

fn container_record(container: &Container) -> RawContainer {
    let limits = container
        .resources
        .as_ref()
        .and_then(|resources| resources.limits.as_ref());

    RawContainer {
        name: Some(container.name.clone()),
        image: container.image.clone(),
        cpu: limits.and_then(|l| l.get("cpu")).and_then(cpu_millis),
        memory: limits.and_then(|l| l.get("memory")).and_then(memory_mebibytes),
        essential: Some(true),
        port_mappings: container
            .ports
            .as_ref()
            .map(|ports| {
                ports
                    .iter()
                    .map(|port| RawPortMapping {
                        container_port: Some(i64::from(port.container_port)),
                        host_port: port.host_port.map(i64::from),
                        protocol: port.protocol.as_ref().map(|p| p.to_lowercase()),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn deployment_status(deployment: &Deployment) -> &'static str {
    if deployment.metadata.deletion_timestamp.is_some() {
        return "DRAINING";
    }
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        });
    if available { "ACTIVE" } else { "PENDING" }
}

fn pod_health(status: &k8s_openapi::api::core::v1::PodStatus) -> String {
    let ready = status.conditions.as_ref().and_then(|conditions| {
        conditions
            .iter()
            .find(|c| c.type_ == "Ready")
            .map(|c| c.status == "True")
    });
    match ready {
        Some(true) => "HEALTHY",
        Some(false) => "UNHEALTHY",
        None => "UNKNOWN",
    }
    .to_string()
}

fn event_time(event: &Event) -> Option<chrono::DateTime<chrono::Utc>> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
}

fn revision(annotations: &Option<std::collections::BTreeMap<String, String>>) -> Option<i64> {
    annotations
        .as_ref()
        .and_then(|a| a.get(REVISION_ANNOTATION))
        .and_then(|r| r.parse().ok())
}

fn selector_string(deployment: &Deployment) -> Option<String> {
    let selector: &LabelSelector = &deployment.spec.as_ref()?.selector;
    let labels = selector.match_labels.as_ref()?;
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// `name:revision` -> (`name`, revision)
fn split_task_definition(task_definition: &str) -> (&str, Option<i64>) {
    match task_definition.rsplit_once(':') {
        Some((family, revision)) => match revision.parse() {
            Ok(revision) => (family, Some(revision)),
            Err(_) => (task_definition, None),
        },
        None => (task_definition, None),
    }
}

/// CPU quantity in millicores ("500m", "2", "0.5")
fn cpu_millis(quantity: &Quantity) -> Option<i64> {
    let value = quantity.0.trim();
    if let Some(millis) = value.strip_suffix('m') {
        return millis.parse().ok();
    }
    value.parse::<f64>().ok().map(|cores| (cores * 1000.0).round() as i64)
}

/// Memory quantity in MiB ("512Mi", "1Gi", "268435456", "500M")
fn memory_mebibytes(quantity: &Quantity) -> Option<i64> {
    const MIB: f64 = 1024.0 * 1024.0;
    let value = quantity.0.trim();
    let suffixes: [(&str, f64); 8] = [
        ("Ki", 1024.0),
        ("Mi", MIB),
        ("Gi", MIB * 1024.0),
        ("Ti", MIB * 1024.0 * 1024.0),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
    ];

    for (suffix, factor) in suffixes {
        if let Some(number) = value.strip_suffix(suffix) {
            return number.parse::<f64>().ok().map(|n| (n * factor / MIB).round() as i64);
        }
    }
    value.parse::<f64>().ok().map(|bytes| (bytes / MIB).round() as i64)
}
