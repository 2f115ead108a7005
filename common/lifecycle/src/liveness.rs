//! Liveness probe derived from consecutive readiness failures.

use std::sync::atomic::{AtomicI64, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::metrics;
use crate::response::probe_response;

/// Escalates a persistent readiness failure into a liveness failure.
///
/// Every failed readiness evaluation increments the streak, every successful one
/// resets it. Liveness fails once the streak exceeds the threshold, so a brief
/// blip in a dependency does not get the process restarted. A threshold <= 0
/// disables cascading. Only atomics are used, no lock.
#[derive(Debug)]
pub struct CascadeTracker {
    failure_streak: AtomicI64,
    threshold: i64,
}

impl CascadeTracker {
    pub fn new(threshold: i64) -> Self {
        Self {
            failure_streak: AtomicI64::new(0),
            threshold,
        }
    }

    /// Feed the outcome of one readiness evaluation.
    pub fn record(&self, failed: bool) {
        if failed {
            let streak = self.failure_streak.fetch_add(1, Ordering::SeqCst) + 1;
            metrics::emit_failure_streak(streak);
            if self.threshold > 0 && streak == self.threshold + 1 {
                warn!(
                    failure_streak = streak,
                    threshold = self.threshold,
                    "readiness failures cascaded into liveness"
                );
            }
        } else {
            self.failure_streak.store(0, Ordering::SeqCst);
            metrics::emit_failure_streak(0);
        }
    }

    pub fn failure_streak(&self) -> i64 {
        self.failure_streak.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    pub fn liveness(&self) -> LivenessStatus {
        if self.threshold > 0 && self.failure_streak() > self.threshold {
            LivenessStatus::Cascaded
        } else {
            LivenessStatus::Healthy
        }
    }
}

/// Liveness verdict. Implements [`IntoResponse`]: 200 `OK` or 500 `CASCADED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessStatus {
    Healthy,
    Cascaded,
}

impl IntoResponse for LivenessStatus {
    fn into_response(self) -> Response {
        match self {
            LivenessStatus::Healthy => probe_response(StatusCode::OK, "OK".to_string()),
            LivenessStatus::Cascaded => {
                probe_response(StatusCode::INTERNAL_SERVER_ERROR, "CASCADED".to_string())
            }
        }
    }
}
