//! Component registry: ordered registration, startup with rollback, health checks and shutdown.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BoxError, LifecycleError};
use crate::metrics;

/// A lifecycle function (startup, check or shutdown) after type erasure.
pub type LifecycleFn =
    Box<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

fn boxed<F, Fut>(f: F) -> LifecycleFn
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Box::new(move |token| f(token).boxed())
}

/// Lifecycle functions of a component. Every function is optional: a missing
/// startup or shutdown is a no-op, a missing check always passes.
#[derive(Default)]
pub struct ComponentOptions {
    startup: Option<LifecycleFn>,
    check: Option<LifecycleFn>,
    shutdown: Option<LifecycleFn>,
}

impl ComponentOptions {
    /// No lifecycle functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once, in registration order, by [`Registry::startup`].
    pub fn with_startup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.startup = Some(boxed(f));
        self
    }

    /// Called on every readiness evaluation; an error marks the component as not ready.
    pub fn with_check<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.check = Some(boxed(f));
        self
    }

    /// Called by [`Registry::shutdown`], and to roll back a failed startup.
    pub fn with_shutdown<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.shutdown = Some(boxed(f));
        self
    }
}

struct Registration {
    name: String,
    options: ComponentOptions,
}

impl Registration {
    async fn shutdown(&self, token: &CancellationToken) -> Result<(), BoxError> {
        match &self.options.shutdown {
            Some(shutdown) => shutdown(token.clone()).await,
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    registrations: Vec<Registration>,
    // Indexes into `registrations`, in the order their startup completed.
    started: Vec<usize>,
}

/// Ordered set of named components. Insertion order is both the start order
/// and the order of the readiness report.
///
/// All operations serialize on a single lock, which is held while lifecycle
/// functions run.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Names are unique for the lifetime of the registry.
    pub async fn component(
        &self,
        name: impl Into<String>,
        options: ComponentOptions,
    ) -> Result<(), LifecycleError> {
        let name = name.into();
        let mut inner = self.inner.lock().await;

        if inner.registrations.iter().any(|r| r.name == name) {
            return Err(LifecycleError::DuplicateComponent { name });
        }

        debug!(
            component = %name,
            startup = options.startup.is_some(),
            check = options.check.is_some(),
            shutdown = options.shutdown.is_some(),
            "Lifecycle: component registered"
        );
        inner.registrations.push(Registration { name, options });
        Ok(())
    }

    /// Number of registered components.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.registrations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Start every component in registration order. On the first failure, the
    /// components already started are shut down in the same order they were
    /// started (their errors are discarded), and the startup error is returned.
    pub async fn startup(&self, token: &CancellationToken) -> Result<(), LifecycleError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        for (idx, reg) in inner.registrations.iter().enumerate() {
            if let Some(startup) = &reg.options.startup {
                if let Err(source) = startup(token.clone()).await {
                    metrics::emit_component_startup(&reg.name, "failed");
                    warn!(component = %reg.name, error = %source, "Lifecycle: component startup failed, rolling back");

                    for &started in &inner.started {
                        let prev = &inner.registrations[started];
                        if let Err(e) = prev.shutdown(token).await {
                            debug!(component = %prev.name, error = %e, "Lifecycle: rollback shutdown error discarded");
                        }
                    }
                    inner.started.clear();

                    return Err(LifecycleError::Startup {
                        component: reg.name.clone(),
                        source,
                    });
                }
            }
            metrics::emit_component_startup(&reg.name, "ok");
            info!(component = %reg.name, "Lifecycle: component started");
            inner.started.push(idx);
        }

        Ok(())
    }

    /// Run every component's check in registration order and hand each result to
    /// `report`. A component without a check function reports `None`.
    pub async fn check<F>(&self, token: &CancellationToken, mut report: F)
    where
        F: FnMut(&str, Option<&BoxError>),
    {
        let inner = self.inner.lock().await;

        for reg in &inner.registrations {
            let result = match &reg.options.check {
                Some(check) => check(token.clone()).await,
                None => Ok(()),
            };
            report(&reg.name, result.as_ref().err());
        }
    }

    /// Shut down every started component in start order, attempting all of them.
    /// The started set is always cleared, so a second call does nothing.
    pub async fn shutdown(&self, token: &CancellationToken) -> Result<(), LifecycleError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let mut failures: Vec<String> = Vec::new();

        for &idx in &inner.started {
            let reg = &inner.registrations[idx];
            match reg.shutdown(token).await {
                Ok(()) => {
                    metrics::emit_component_shutdown(&reg.name, "ok");
                    info!(component = %reg.name, "Lifecycle: component shut down");
                }
                Err(e) => {
                    metrics::emit_component_shutdown(&reg.name, "failed");
                    warn!(component = %reg.name, error = %e, "Lifecycle: component shutdown failed");
                    failures.push(e.to_string());
                }
            }
        }
        inner.started.clear();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Shutdown {
                message: failures.join("; "),
            })
        }
    }
}
