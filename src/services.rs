pub mod cache;
pub mod collector;
pub mod details;
pub mod refresh;

pub use cache::SnapshotCache;
pub use refresh::{RefreshCoordinator, TriggerOutcome};
