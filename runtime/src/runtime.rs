use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{middleware, Router};
use common_metrics::track_metrics;
use futures::FutureExt;
use lifecycle::{
    CascadeTracker, ComponentOptions, LifecycleError, LivenessStatus, ReadinessReport, Registry,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::info;

use crate::error::{panic_response, RuntimeError};
use crate::gate::ConcurrencyGate;

/// Paths under this prefix are served by the debug routes, outside the gate.
pub const DEBUG_PATH_PREFIX: &str = "/debug/";

pub const DEFAULT_CONCURRENCY: i64 = 128;
pub const DEFAULT_READINESS_CASCADE: i64 = 5;
pub const DEFAULT_READINESS_PATH: &str = "/debug/ready";
pub const DEFAULT_LIVENESS_PATH: &str = "/debug/alive";
pub const DEFAULT_METRICS_PATH: &str = "/debug/metrics";

#[derive(Clone)]
pub struct RuntimeOptions {
    concurrency: i64,
    readiness_cascade: i64,
    readiness_path: String,
    liveness_path: String,
    metrics_path: String,
    metrics_handle: Option<PrometheusHandle>,
    debug_routes: Router,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            readiness_cascade: DEFAULT_READINESS_CASCADE,
            readiness_path: DEFAULT_READINESS_PATH.to_string(),
            liveness_path: DEFAULT_LIVENESS_PATH.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            metrics_handle: None,
            debug_routes: Router::new(),
        }
    }
}

impl RuntimeOptions {
    /// Maximum number of application requests handled at once, <= 0 for no limit.
    pub fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Consecutive readiness failures tolerated before liveness fails, <= 0 to
    /// never fail liveness.
    pub fn with_readiness_cascade(mut self, threshold: i64) -> Self {
        self.readiness_cascade = threshold;
        self
    }

    pub fn with_readiness_path(mut self, path: impl Into<String>) -> Self {
        self.readiness_path = path.into();
        self
    }

    pub fn with_liveness_path(mut self, path: impl Into<String>) -> Self {
        self.liveness_path = path.into();
        self
    }

    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = path.into();
        self
    }

    /// Serve this handle's rendering on the metrics path. Without one the path
    /// answers 404.
    pub fn with_metrics_handle(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Router for everything under [`DEBUG_PATH_PREFIX`] that is not a probe or
    /// the metrics path. Routes are matched against the full request path.
    pub fn with_debug_routes(mut self, routes: Router) -> Self {
        self.debug_routes = routes;
        self
    }

    pub fn concurrency(&self) -> i64 {
        self.concurrency
    }

    pub fn readiness_cascade(&self) -> i64 {
        self.readiness_cascade
    }

    pub fn readiness_path(&self) -> &str {
        &self.readiness_path
    }

    pub fn liveness_path(&self) -> &str {
        &self.liveness_path
    }

    pub fn metrics_path(&self) -> &str {
        &self.metrics_path
    }
}

struct RuntimeInner {
    readiness_path: String,
    liveness_path: String,
    metrics_path: String,
    metrics_handle: Option<PrometheusHandle>,
    debug_routes: Router,
    registry: Registry,
    cascade: CascadeTracker,
    gate: ConcurrencyGate,
    started: AtomicBool,
}

/// Ties the component registry, the readiness cascade and the admission gate
/// to an HTTP router. Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeOptions::default())
    }
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        let RuntimeOptions {
            concurrency,
            readiness_cascade,
            readiness_path,
            liveness_path,
            metrics_path,
            metrics_handle,
            debug_routes,
        } = options;

        Self {
            inner: Arc::new(RuntimeInner {
                readiness_path,
                liveness_path,
                metrics_path,
                metrics_handle,
                debug_routes,
                registry: Registry::new(),
                cascade: CascadeTracker::new(readiness_cascade),
                gate: ConcurrencyGate::new(concurrency),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub async fn component(
        &self,
        name: impl Into<String>,
        options: ComponentOptions,
    ) -> Result<(), LifecycleError> {
        self.inner.registry.component(name, options).await
    }

    /// Start every registered component. Only the first call does anything.
    pub async fn startup(&self, token: &CancellationToken) -> Result<(), RuntimeError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyStarted);
        }

        info!(
            components = self.inner.registry.len().await,
            "Runtime: starting components"
        );
        self.inner.registry.startup(token).await?;
        Ok(())
    }

    pub async fn shutdown(&self, token: &CancellationToken) -> Result<(), RuntimeError> {
        info!("Runtime: shutting down components");
        self.inner.registry.shutdown(token).await?;
        Ok(())
    }

    /// Run every component check and feed the verdict to the cascade.
    pub async fn readiness(&self) -> ReadinessReport {
        // Cancelled when this evaluation completes or its future is dropped.
        let token = CancellationToken::new();
        let _cancel_on_drop = token.clone().drop_guard();

        let report = ReadinessReport::evaluate(&self.inner.registry, &token).await;
        self.inner.cascade.record(report.failed());
        report
    }

    pub fn liveness(&self) -> LivenessStatus {
        self.inner.cascade.liveness()
    }

    pub fn cascade(&self) -> &CascadeTracker {
        &self.inner.cascade
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.inner.gate
    }

    /// Wrap the application router: probes, metrics and debug routes are
    /// answered directly, everything else goes through the admission gate.
    /// The ticket is held while the handler runs and released once it returns
    /// its response, so streaming a response body is not counted.
    pub fn router(&self, app: Router) -> Router {
        let state = DispatchState {
            runtime: self.clone(),
            app: app.layer(middleware::from_fn(track_metrics)),
        };
        Router::new().fallback(dispatch).with_state(state)
    }
}

#[derive(Clone)]
struct DispatchState {
    runtime: Runtime,
    app: Router,
}

async fn dispatch(State(state): State<DispatchState>, req: Request) -> Response {
    let inner = &state.runtime.inner;
    let path = req.uri().path();

    // Readiness first: it wins when both probes share a path.
    if path == inner.readiness_path {
        return state.runtime.readiness().await.into_response();
    }
    if path == inner.liveness_path {
        return state.runtime.liveness().into_response();
    }
    if path == inner.metrics_path {
        return match &inner.metrics_handle {
            Some(handle) => handle.render().into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        };
    }
    if path.starts_with(DEBUG_PATH_PREFIX) {
        return into_response(inner.debug_routes.clone().oneshot(req).await);
    }

    let _ticket = inner.gate.acquire().await;
    match AssertUnwindSafe(state.app.oneshot(req)).catch_unwind().await {
        Ok(response) => into_response(response),
        Err(payload) => panic_response(payload),
    }
}

fn into_response(result: Result<Response, Infallible>) -> Response {
    match result {
        Ok(response) => response,
        Err(never) => match never {},
    }
}
