//! Refresh coordinator: periodic refresh of every alias plus on-demand
//! refresh of a single alias, with at most one on-demand fetch per alias.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::aliases::AliasConfig;
use crate::errors::{ApiError, Result};
use crate::gateway::{GatewayResult, MetricsGateway};
use crate::models::snapshot::RefreshStatusReport;
use crate::models::RefreshStatus;
use crate::services::cache::SnapshotCache;
use crate::services::collector::collect_alias;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A fetch was spawned
    Started,
    /// A fetch for the alias is already running; nothing was started
    AlreadyInProgress,
}

pub struct RefreshCoordinator {
    aliases: Arc<AliasConfig>,
    cache: Arc<SnapshotCache>,
    gateway: Arc<dyn MetricsGateway>,
    statuses: Mutex<HashMap<String, RefreshStatus>>,
    workers: Arc<Semaphore>,
}

impl RefreshCoordinator {
    pub fn new(
        aliases: Arc<AliasConfig>,
        cache: Arc<SnapshotCache>,
        gateway: Arc<dyn MetricsGateway>,
        max_concurrent_refreshes: usize,
    ) -> Self {
        Self {
            aliases,
            cache,
            gateway,
            statuses: Mutex::new(HashMap::new()),
            workers: Arc::new(Semaphore::new(max_concurrent_refreshes.max(1))),
        }
    }

    pub fn aliases(&self) -> &AliasConfig {
        &self.aliases
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Fetch fresh snapshots for one alias and replace its cache entry
    #[instrument(skip(self))]
    pub async fn refresh_alias(&self, alias: &str, profile: &str) -> GatewayResult<usize> {
        let collected_at = Utc::now();
        let snapshots = collect_alias(self.gateway.as_ref(), alias, profile, collected_at).await?;
        let count = snapshots.len();

        self.cache.put(alias, snapshots, collected_at);
        Ok(count)
    }

    /// Start an on-demand refresh of `alias` without waiting for it
    pub fn trigger(self: &Arc<Self>, alias: &str) -> Result<TriggerOutcome> {
        let profile = self
            .aliases
            .profile(alias)
            .ok_or_else(|| ApiError::NotFound(format!("Alias '{}' not found", alias)))?
            .to_string();

        let Some(guard) = self.claim(alias) else {
            info!("Refresh already in progress for alias {}", alias);
            return Ok(TriggerOutcome::AlreadyInProgress);
        };

        let coordinator = Arc::clone(self);
        let alias = alias.to_string();
        tokio::spawn(async move {
            let _permit = Arc::clone(&coordinator.workers).acquire_owned().await;

            info!("Starting on-demand refresh for alias {}", alias);
            match coordinator.refresh_alias(&alias, &profile).await {
                Ok(count) => {
                    info!("Refreshed alias {} with {} services", alias, count);
                    guard.finish(RefreshStatus::completed());
                }
                Err(e) => {
                    warn!("On-demand refresh for alias {} failed: {}", alias, e);
                    guard.finish(RefreshStatus::failed(e));
                }
            }
        });

        Ok(TriggerOutcome::Started)
    }

    /// Current refresh status of a configured alias
    pub fn status(&self, alias: &str) -> Result<RefreshStatus> {
        if !self.aliases.contains(alias) {
            return Err(ApiError::NotFound(format!("Alias '{}' not found", alias)));
        }

        let statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(statuses.get(alias).cloned().unwrap_or_default())
    }

    pub fn report(&self, alias: &str) -> Result<RefreshStatusReport> {
        Ok(RefreshStatusReport {
            alias: alias.to_string(),
            status: self.status(alias)?,
            last_updated: self.cache.last_updated(alias).map(|t| t.to_rfc3339()),
        })
    }

    /// Refresh every configured alias once. Each alias runs in its own task, so
    /// an error or panic in one alias is logged and the others still refresh.
    pub async fn run_cycle(self: &Arc<Self>) {
        info!("Starting refresh cycle for {} aliases", self.aliases.len());

        for (alias, profile) in self.aliases.iter() {
            let coordinator = Arc::clone(self);
            let (task_alias, profile) = (alias.to_string(), profile.to_string());
            let fetch =
                tokio::spawn(async move { coordinator.refresh_alias(&task_alias, &profile).await });

            match fetch.await {
                Ok(Ok(count)) => {
                    info!("Periodic refresh of alias {} cached {} services", alias, count);
                    self.record_periodic_success(alias);
                }
                Ok(Err(e)) => {
                    error!("Periodic refresh of alias {} failed: {}", alias, e);
                }
                Err(e) => {
                    error!("Periodic refresh of alias {} aborted: {}", alias, e);
                }
            }
        }
    }

    /// Run [`Self::run_cycle`] now and then once every `every`, until the handle is aborted
    pub fn spawn_periodic(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let cycle = Arc::clone(&coordinator);
                if let Err(e) = tokio::spawn(async move { cycle.run_cycle().await }).await {
                    error!("Refresh cycle aborted: {}", e);
                }
            }
        })
    }

    /// Mark `alias` in progress unless it already is
    fn claim(self: &Arc<Self>, alias: &str) -> Option<InFlightGuard> {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        let status = statuses.entry(alias.to_string()).or_default();
        if status.in_progress {
            return None;
        }
        *status = RefreshStatus::started();

        Some(InFlightGuard {
            coordinator: Arc::clone(self),
            alias: alias.to_string(),
            outcome: None,
        })
    }

    fn record_periodic_success(&self, alias: &str) {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        let status = statuses.entry(alias.to_string()).or_default();
        if !status.in_progress {
            *status = RefreshStatus::completed();
        }
    }

    fn release(&self, alias: &str, outcome: RefreshStatus) {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        statuses.insert(
            alias.to_string(),
            RefreshStatus {
                in_progress: false,
                ..outcome
            },
        );
    }
}

/// Clears the in-progress flag when dropped, whatever happened to the fetch
struct InFlightGuard {
    coordinator: Arc<RefreshCoordinator>,
    alias: String,
    outcome: Option<RefreshStatus>,
}

impl InFlightGuard {
    fn finish(mut self, outcome: RefreshStatus) {
        self.outcome = Some(outcome);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| RefreshStatus::failed("refresh task aborted"));
        self.coordinator.release(&self.alias, outcome);
    }
}
