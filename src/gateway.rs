//! Remote metrics gateway: the orchestration control plane plus the metrics
//! time-series service, seen through one object-safe interface.
//!
//! Every record handed back is "raw": fields are optional and nothing is
//! validated. Reshaping into snapshots and detail documents happens in
//! `services::collector` and `services::details` through total conversions.

pub mod kubernetes;
pub mod prometheus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use kubernetes::KubernetesGateway;
pub use prometheus::PrometheusClient;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Debug)]
pub enum GatewayError {
    /// Control plane API call failed
    Kube(kube::Error),

    /// Profile could not be turned into a client
    Kubeconfig(String),

    /// HTTP request to the metrics service failed
    Http(reqwest::Error),

    /// Metrics service answered with an error or an unexpected payload
    Metrics(String),

    /// Requested object does not exist
    NotFound(String),

    /// Generic error with message
    Other(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Kube(err) => write!(f, "control plane error: {}", err),
            GatewayError::Kubeconfig(msg) => write!(f, "profile error: {}", msg),
            GatewayError::Http(err) => write!(f, "HTTP error: {}", err),
            GatewayError::Metrics(msg) => write!(f, "metrics error: {}", msg),
            GatewayError::NotFound(msg) => write!(f, "{}", msg),
            GatewayError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Kube(err) => Some(err),
            GatewayError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<kube::Error> for GatewayError {
    fn from(err: kube::Error) -> Self {
        GatewayError::Kube(err)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Http(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Cpu,
    Memory,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Cpu => write!(f, "CPUUtilization"),
            MetricKind::Memory => write!(f, "MemoryUtilization"),
        }
    }
}

/// Time range ending now, sampled at `period` resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricWindow {
    pub lookback: Duration,
    pub period: Duration,
}

impl MetricWindow {
    /// Last five minutes at five minute resolution
    pub const CURRENT: MetricWindow = MetricWindow {
        lookback: Duration::from_secs(5 * 60),
        period: Duration::from_secs(300),
    };

    /// Last six hours at thirty minute resolution
    pub const HISTORY: MetricWindow = MetricWindow {
        lookback: Duration::from_secs(6 * 60 * 60),
        period: Duration::from_secs(1800),
    };
}

#[async_trait]
pub trait MetricsGateway: Send + Sync {
    async fn list_clusters(&self, profile: &str) -> GatewayResult<Vec<String>>;

    async fn list_services(&self, profile: &str, cluster: &str) -> GatewayResult<Vec<RawService>>;

    /// `None` when the service does not exist in the cluster
    async fn describe_service(
        &self,
        profile: &str,
        cluster: &str,
        service: &str,
    ) -> GatewayResult<Option<RawService>>;

    async fn describe_task_definition(
        &self,
        profile: &str,
        cluster: &str,
        task_definition: &str,
    ) -> GatewayResult<RawTaskDefinition>;

    async fn list_tasks(&self, profile: &str, cluster: &str, service: &str) -> GatewayResult<Vec<String>>;

    async fn describe_tasks(
        &self,
        profile: &str,
        cluster: &str,
        task_ids: &[String],
    ) -> GatewayResult<Vec<RawTask>>;

    async fn scaling_activities(
        &self,
        profile: &str,
        cluster: &str,
        service: &str,
    ) -> GatewayResult<Vec<RawScalingActivity>>;

    async fn scaling_policies(
        &self,
        profile: &str,
        cluster: &str,
        service: &str,
    ) -> GatewayResult<Vec<RawScalingPolicy>>;

    /// Per-period maxima for `metric` over `window`, oldest first
    async fn metric_series(
        &self,
        profile: &str,
        cluster: &str,
        service: &str,
        metric: MetricKind,
        window: MetricWindow,
    ) -> GatewayResult<Vec<f64>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawService {
    pub service_arn: Option<String>,
    pub service_name: Option<String>,
    pub status: Option<String>,
    pub task_definition: Option<String>,
    pub desired_count: Option<i64>,
    pub running_count: Option<i64>,
    pub launch_type: Option<String>,
    pub platform_version: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub deployments: Vec<RawDeployment>,
    pub events: Vec<RawServiceEvent>,
    pub load_balancers: Vec<RawLoadBalancer>,
    pub network: Option<RawNetwork>,
    pub deployment_configuration: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawDeployment {
    pub id: Option<String>,
    pub status: Option<String>,
    pub task_definition: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub rollout_completed_percent: Option<f64>,
    pub running_count: Option<i64>,
    pub desired_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawServiceEvent {
    pub message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RawLoadBalancer {
    pub target_group_arn: Option<String>,
    pub load_balancer_name: Option<String>,
    pub container_name: Option<String>,
    pub container_port: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawNetwork {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawTaskDefinition {
    pub family: Option<String>,
    pub revision: Option<i64>,
    pub containers: Vec<RawContainer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawContainer {
    pub name: Option<String>,
    pub image: Option<String>,
    pub cpu: Option<i64>,
    pub memory: Option<i64>,
    pub essential: Option<bool>,
    pub port_mappings: Vec<RawPortMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RawPortMapping {
    pub container_port: Option<i64>,
    pub host_port: Option<i64>,
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawTask {
    pub task_arn: Option<String>,
    pub health_status: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub container_instance_arn: Option<String>,
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawScalingActivity {
    pub activity_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub status_code: Option<String>,
    pub cause: Option<String>,
    /// Codes explaining why no scaling happened, most relevant first
    pub not_scaled_reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawScalingPolicy {
    pub policy_name: Option<String>,
    pub policy_type: Option<String>,
    pub target_value: Option<f64>,
    pub min_capacity: Option<i64>,
    pub max_capacity: Option<i64>,
}
