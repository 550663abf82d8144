use serde::{Deserialize, Serialize};

/// Number of samples kept in every historical series
pub const HISTORY_LEN: usize = 12;

pub const STATUS_NOT_STARTED: &str = "Not started";
pub const STATUS_IN_PROGRESS: &str = "Refresh in progress";
pub const STATUS_COMPLETED: &str = "Refresh completed";

/// Observed state of one orchestration service at refresh time
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServiceSnapshot {
    pub account_alias: String,
    pub cluster_name: String,
    pub service_name: String,
    pub running_tasks: u32,
    pub current_cpu: f64,
    pub current_memory: f64,
    /// Oldest first. Empty when historical sampling was not attempted,
    /// otherwise exactly [`HISTORY_LEN`] values.
    #[serde(default)]
    pub historical_cpu: Vec<f64>,
    #[serde(default)]
    pub historical_memory: Vec<f64>,
    pub last_updated: String,
}

/// Fit a chronological series to exactly [`HISTORY_LEN`] values: short series
/// are padded with leading zeros, long ones keep their most recent samples.
pub fn normalize_history(samples: &[f64]) -> Vec<f64> {
    if samples.len() >= HISTORY_LEN {
        return samples[samples.len() - HISTORY_LEN..].to_vec();
    }

    let mut series = vec![0.0; HISTORY_LEN - samples.len()];
    series.extend_from_slice(samples);
    series
}

/// Per-alias state of the refresh coordinator
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefreshStatus {
    pub in_progress: bool,
    pub status: String,
}

impl RefreshStatus {
    pub fn not_started() -> Self {
        Self {
            in_progress: false,
            status: STATUS_NOT_STARTED.to_string(),
        }
    }

    pub fn started() -> Self {
        Self {
            in_progress: true,
            status: STATUS_IN_PROGRESS.to_string(),
        }
    }

    pub fn completed() -> Self {
        Self {
            in_progress: false,
            status: STATUS_COMPLETED.to_string(),
        }
    }

    pub fn failed(cause: impl std::fmt::Display) -> Self {
        Self {
            in_progress: false,
            status: format!("Refresh failed: {}", cause),
        }
    }
}

impl Default for RefreshStatus {
    fn default() -> Self {
        Self::not_started()
    }
}

/// Body of `GET /refresh-status`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefreshStatusReport {
    pub alias: String,
    #[serde(flatten)]
    pub status: RefreshStatus,
    pub last_updated: Option<String>,
}
