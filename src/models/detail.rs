//! Detail document returned by `GET /service-details`

use serde::{Deserialize, Serialize};

use crate::gateway::{RawLoadBalancer, RawPortMapping};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServiceDetails {
    pub service_overview: ServiceOverview,
    pub deployment_info: DeploymentInfo,
    pub current_tasks: CurrentTasks,
    pub events: ServiceEvents,
    pub configuration: ServiceConfiguration,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServiceOverview {
    pub service_arn: String,
    pub creation_date: String,
    pub task_definition: String,
    pub desired_count: i64,
    pub launch_type: String,
    pub platform_version: String,
    pub status: String,
    pub historical_cpu: Vec<f64>,
    pub historical_memory: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeploymentInfo {
    pub current_deployment: CurrentDeployment,
    pub deployment_history: Vec<DeploymentHistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CurrentDeployment {
    pub id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub task_definition: String,
    pub rollout_progress: f64,
    pub running_count: i64,
    pub desired_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeploymentHistoryEntry {
    pub id: String,
    pub status: String,
    pub task_definition: String,
    pub created_at: String,
    pub completed_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CurrentTasks {
    pub running_count: i64,
    pub desired_count: i64,
    pub tasks: Vec<TaskInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskInfo {
    pub task_id: String,
    pub health_status: String,
    pub started_at: String,
    pub container_instance: String,
    pub availability_zone: String,
    pub task_definition: TaskDefinitionInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TaskDefinitionInfo {
    pub family: String,
    pub revision: i64,
    pub containers: Vec<ContainerInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerInfo {
    pub name: String,
    pub image: String,
    pub cpu: i64,
    pub memory: i64,
    pub essential: bool,
    #[serde(rename = "portMappings")]
    pub port_mappings: Vec<RawPortMapping>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServiceEvents {
    pub service_events: Vec<ServiceEvent>,
    pub scaling_events: Vec<ScalingEvent>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServiceEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScalingEvent {
    pub activity_id: String,
    pub start_time: String,
    pub description: String,
    pub status_code: String,
    pub cause: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServiceConfiguration {
    pub service_definition: ServiceDefinition,
    pub load_balancer: LoadBalancerSection,
    pub auto_scaling: AutoScalingConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub service_name: String,
    pub task_definition: String,
    pub desired_count: i64,
    pub launch_type: String,
    pub platform_version: String,
    pub deployment_configuration: serde_json::Value,
}

/// Serializes as `{}` when the service has no load balancer attached
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum LoadBalancerSection {
    Attached {
        #[serde(rename = "type")]
        balancer_type: String,
        target_group_arn: String,
        config: RawLoadBalancer,
    },
    Detached {},
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AutoScalingConfig {
    pub min_capacity: i64,
    pub max_capacity: i64,
    pub status: String,
    pub policies: Vec<ScalingPolicyInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScalingPolicyInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    pub target_value: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NetworkConfig {
    pub network_mode: String,
    pub assign_public_ip: bool,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
}
