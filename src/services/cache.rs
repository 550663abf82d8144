//! In-memory snapshot cache, one entry per alias

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::models::ServiceSnapshot;

/// Latest snapshot list of every refreshed alias.
///
/// Entries are replaced whole: a reader holds an `Arc` to either the old or
/// the new list, never a mix. Aliases are never removed.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    inner: RwLock<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    /// Aliases in order of their first successful refresh
    order: Vec<String>,
    entries: HashMap<String, CachedAlias>,
}

#[derive(Debug, Clone)]
struct CachedAlias {
    snapshots: Arc<Vec<ServiceSnapshot>>,
    updated_at: DateTime<Utc>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshots for `alias`, empty when it was never refreshed
    pub fn get(&self, alias: &str) -> Arc<Vec<ServiceSnapshot>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .get(alias)
            .map(|entry| Arc::clone(&entry.snapshots))
            .unwrap_or_default()
    }

    /// Every alias's snapshots, concatenated in alias insertion order
    pub fn get_all(&self) -> Vec<ServiceSnapshot> {
        let lists: Vec<Arc<Vec<ServiceSnapshot>>> = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            inner
                .order
                .iter()
                .filter_map(|alias| inner.entries.get(alias))
                .map(|entry| Arc::clone(&entry.snapshots))
                .collect()
        };

        lists.iter().flat_map(|list| list.iter().cloned()).collect()
    }

    /// Replace the snapshot list and timestamp of `alias`
    pub fn put(&self, alias: &str, snapshots: Vec<ServiceSnapshot>, updated_at: DateTime<Utc>) {
        let count = snapshots.len();
        let entry = CachedAlias {
            snapshots: Arc::new(snapshots),
            updated_at,
        };

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.entries.insert(alias.to_string(), entry).is_none() {
            inner.order.push(alias.to_string());
        }

        debug!("Cached {} snapshots for alias {}", count, alias);
    }

    pub fn last_updated(&self, alias: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(alias).map(|entry| entry.updated_at)
    }

    /// Aliases that hold an entry, in insertion order
    pub fn aliases(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.order.clone()
    }
}
