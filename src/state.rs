use std::sync::Arc;

use crate::aliases::AliasConfig;
use crate::gateway::MetricsGateway;
use crate::services::{RefreshCoordinator, SnapshotCache};

// App state
pub struct AppState {
    pub aliases: Arc<AliasConfig>,
    pub cache: Arc<SnapshotCache>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub gateway: Arc<dyn MetricsGateway>,
}

impl AppState {
    pub fn new(aliases: AliasConfig, gateway: Arc<dyn MetricsGateway>, refresh_workers: usize) -> Self {
        let aliases = Arc::new(aliases);
        let cache = Arc::new(SnapshotCache::new());
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&aliases),
            Arc::clone(&cache),
            Arc::clone(&gateway),
            refresh_workers,
        ));

        Self {
            aliases,
            cache,
            coordinator,
            gateway,
        }
    }

    /// Gateway profile of `alias`
    pub fn profile(&self, alias: &str) -> crate::errors::Result<&str> {
        self.aliases
            .profile(alias)
            .ok_or_else(|| crate::errors::ApiError::NotFound(format!("Alias '{}' not found", alias)))
    }
}
