//! Readiness probe: aggregates every component check into one text report.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics;
use crate::registry::Registry;
use crate::response::probe_response;

/// Outcome of one readiness evaluation. Implements [`IntoResponse`]: 200 with
/// the report when every check passed, 500 otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    body: String,
    failed: bool,
}

impl ReadinessReport {
    /// Run every registered check, in registration order. One line per component,
    /// `"<name>: OK"` or `"<name>: <error>"`; `"OK"` when nothing is registered.
    pub async fn evaluate(registry: &Registry, token: &CancellationToken) -> Self {
        let mut body = String::new();
        let mut failed = false;

        registry
            .check(token, |name, err| {
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(name);
                body.push_str(": ");
                match err {
                    None => body.push_str("OK"),
                    Some(e) => {
                        failed = true;
                        body.push_str(&e.to_string());
                    }
                }
            })
            .await;

        if body.is_empty() {
            body.push_str("OK");
        }

        metrics::emit_readiness_check(failed);
        if failed {
            warn!(report = %body, "readiness check failed");
        }

        Self { body, failed }
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl IntoResponse for ReadinessReport {
    fn into_response(self) -> Response {
        let status = if self.failed {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };
        probe_response(status, self.body)
    }
}
