//! Component lifecycle for HTTP services: ordered startup with rollback, ordered
//! shutdown with error aggregation, readiness aggregation over component checks,
//! and a liveness probe that only fails after readiness has failed persistently.

mod error;
mod liveness;
mod metrics;
mod readiness;
mod registry;
mod response;

pub use error::{BoxError, LifecycleError};
pub use liveness::{CascadeTracker, LivenessStatus};
pub use readiness::ReadinessReport;
pub use registry::{ComponentOptions, LifecycleFn, Registry};
