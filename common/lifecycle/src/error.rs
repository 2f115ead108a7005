//! Lifecycle error types returned by the registry.

use thiserror::Error;

/// Error type returned by lifecycle functions (startup, check, shutdown).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`Registry`](crate::Registry) operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A component with the same name was already registered. This is a wiring
    /// mistake in the composition root and should abort boot.
    #[error("duplicated component with name: {name}")]
    DuplicateComponent { name: String },

    /// A component's startup function failed. Already-started components were
    /// shut down before this was returned. Displays as the startup error.
    #[error("{source}")]
    Startup {
        component: String,
        #[source]
        source: BoxError,
    },

    /// One or more shutdown functions failed; messages joined with `"; "`.
    #[error("{message}")]
    Shutdown { message: String },
}

impl LifecycleError {
    /// Name of the component the error relates to, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            LifecycleError::DuplicateComponent { name } => Some(name),
            LifecycleError::Startup { component, .. } => Some(component),
            LifecycleError::Shutdown { .. } => None,
        }
    }
}
