pub mod detail;
pub mod snapshot;

pub use detail::ServiceDetails;
pub use snapshot::{RefreshStatus, ServiceSnapshot};
