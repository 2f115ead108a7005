use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

const METRIC_GATE_INFLIGHT: &str = "runtime_gate_inflight";
const METRIC_GATE_THROTTLED: &str = "runtime_gate_throttled_total";

/// Admission control for request handling: a fixed pool of tickets.
///
/// A capacity <= 0 disables the gate, `acquire` then returns immediately.
/// Acquisition waits without timeout and cannot be cancelled other than by
/// dropping the waiting future.
#[derive(Clone, Debug, Default)]
pub struct ConcurrencyGate {
    semaphore: Option<Arc<Semaphore>>,
}

impl ConcurrencyGate {
    pub fn new(capacity: i64) -> Self {
        match usize::try_from(capacity) {
            Ok(capacity) if capacity > 0 => Self {
                semaphore: Some(Arc::new(Semaphore::new(
                    capacity.min(Semaphore::MAX_PERMITS),
                ))),
            },
            _ => Self::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.semaphore.is_some()
    }

    /// Free tickets right now, `None` when the gate is disabled.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Wait for a ticket. The ticket goes back to the pool when dropped.
    pub async fn acquire(&self) -> Ticket {
        let Some(semaphore) = &self.semaphore else {
            return Ticket { permit: None };
        };

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                metrics::counter!(METRIC_GATE_THROTTLED).increment(1);
                // The semaphore is never closed, so this only errors if that changes.
                semaphore.clone().acquire_owned().await.ok()
            }
        };

        if permit.is_some() {
            metrics::gauge!(METRIC_GATE_INFLIGHT).increment(1.0);
        }
        Ticket { permit }
    }
}

/// Admission ticket held for the duration of one request.
#[derive(Debug)]
pub struct Ticket {
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.permit.take().is_some() {
            metrics::gauge!(METRIC_GATE_INFLIGHT).decrement(1.0);
        }
    }
}
