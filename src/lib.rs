//! Heartbeat API
//!
//! Monitoring dashboard backend: periodically polls a container-orchestration
//! control plane and its metrics service for a set of named accounts
//! ("aliases"), caches per-service snapshots in memory, and serves them over
//! an authenticated HTTP API alongside on-demand refresh and live service details.

pub mod aliases;
pub mod auth;
pub mod config;
pub mod controllers;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use aliases::AliasConfig;
pub use auth::AuthService;
pub use config::Config;
pub use errors::{ApiError, Result};
pub use gateway::{GatewayError, MetricsGateway};
pub use models::{RefreshStatus, ServiceDetails, ServiceSnapshot};
pub use services::{RefreshCoordinator, SnapshotCache, TriggerOutcome};
pub use state::AppState;
