#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

use heartbeat_api::auth::crypto::{EmailCipher, PasswordHasher};
use heartbeat_api::auth::models::{Role, UserCreate};
use heartbeat_api::auth::store::UserTable;
use heartbeat_api::auth::tokens::JwtHandler;
use heartbeat_api::gateway::{
    GatewayError, GatewayResult, MetricKind, MetricWindow, MetricsGateway, RawScalingActivity,
    RawScalingPolicy, RawService, RawTask, RawTaskDefinition,
};
use heartbeat_api::{AliasConfig, AppState, AuthService};

pub const JWT_SECRET: &str = "integration-secret";

/// In-process stand-in for the control plane and metrics service
#[derive(Default)]
pub struct FakeGateway {
    /// profile -> cluster -> services
    pub profiles: HashMap<String, HashMap<String, Vec<RawService>>>,
    pub history_cpu: Vec<f64>,
    pub current_cpu: f64,
    pub gate: Option<Arc<Notify>>,
    pub listings: AtomicUsize,
}

impl FakeGateway {
    pub fn with_service(profile: &str, cluster: &str, name: &str, running: i64) -> Self {
        let mut gateway = Self::default();
        gateway.add_service(profile, cluster, name, running);
        gateway
    }

    pub fn add_service(&mut self, profile: &str, cluster: &str, name: &str, running: i64) {
        self.profiles
            .entry(profile.to_string())
            .or_default()
            .entry(cluster.to_string())
            .or_default()
            .push(RawService {
                service_name: Some(name.to_string()),
                running_count: Some(running),
                desired_count: Some(running),
                task_definition: Some(format!("{}:1", name)),
                ..RawService::default()
            });
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsGateway for FakeGateway {
    async fn list_clusters(&self, profile: &str) -> GatewayResult<Vec<String>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let mut clusters: Vec<String> = self
            .profiles
            .get(profile)
            .map(|clusters| clusters.keys().cloned().collect())
            .unwrap_or_default();
        clusters.sort();
        Ok(clusters)
    }

    async fn list_services(&self, profile: &str, cluster: &str) -> GatewayResult<Vec<RawService>> {
        Ok(self
            .profiles
            .get(profile)
            .and_then(|clusters| clusters.get(cluster))
            .cloned()
            .unwrap_or_default())
    }

    async fn describe_service(
        &self,
        profile: &str,
        cluster: &str,
        service: &str,
    ) -> GatewayResult<Option<RawService>> {
        let services = self.list_services(profile, cluster).await?;
        Ok(services
            .into_iter()
            .find(|s| s.service_name.as_deref() == Some(service)))
    }

    async fn describe_task_definition(&self, _: &str, _: &str, id: &str) -> GatewayResult<RawTaskDefinition> {
        Ok(RawTaskDefinition {
            family: id.split(':').next().map(str::to_string),
            revision: Some(1),
            containers: Vec::new(),
        })
    }

    async fn list_tasks(&self, _: &str, _: &str, service: &str) -> GatewayResult<Vec<String>> {
        Ok(vec![format!("{}-task-1", service)])
    }

    async fn describe_tasks(&self, _: &str, _: &str, ids: &[String]) -> GatewayResult<Vec<RawTask>> {
        Ok(ids
            .iter()
            .map(|id| RawTask {
                task_arn: Some(id.clone()),
                health_status: Some("HEALTHY".to_string()),
                ..RawTask::default()
            })
            .collect())
    }

    async fn scaling_activities(&self, _: &str, _: &str, _: &str) -> GatewayResult<Vec<RawScalingActivity>> {
        Ok(Vec::new())
    }

    async fn scaling_policies(&self, _: &str, _: &str, _: &str) -> GatewayResult<Vec<RawScalingPolicy>> {
        Err(GatewayError::Other("autoscaling unavailable".to_string()))
    }

    async fn metric_series(
        &self,
        _: &str,
        _: &str,
        _: &str,
        metric: MetricKind,
        window: MetricWindow,
    ) -> GatewayResult<Vec<f64>> {
        match (metric, window == MetricWindow::HISTORY) {
            (MetricKind::Cpu, true) => Ok(self.history_cpu.clone()),
            (MetricKind::Cpu, false) => Ok(vec![self.current_cpu]),
            (MetricKind::Memory, _) => Ok(Vec::new()),
        }
    }
}

pub fn state(aliases: &[(&str, &str)], gateway: Arc<FakeGateway>) -> AppState {
    AppState::new(AliasConfig::new(aliases.iter().copied()), gateway, 2)
}

pub fn auth() -> AuthService {
    AuthService::new(
        UserTable::in_memory(),
        PasswordHasher::with_rounds(10),
        EmailCipher::new("integration-key"),
        JwtHandler::new(JWT_SECRET, "HS256").unwrap(),
        true,
    )
}

/// Create a user and return a bearer token for it
pub fn sign_in(auth: &AuthService, username: &str, role: Role) -> String {
    let user = auth
        .create_user(UserCreate {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: "correct horse".to_string(),
            role,
        })
        .unwrap();
    auth.issue_token(&user).unwrap().token
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
