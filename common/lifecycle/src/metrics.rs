pub(crate) const METRIC_COMPONENT_STARTUP: &str = "lifecycle_component_startup_total";
pub(crate) const METRIC_COMPONENT_SHUTDOWN: &str = "lifecycle_component_shutdown_total";
pub(crate) const METRIC_READINESS_CHECKS: &str = "lifecycle_readiness_checks_total";
pub(crate) const METRIC_READINESS_FAILURE_STREAK: &str = "lifecycle_readiness_failure_streak";

pub(crate) fn emit_component_startup(component: &str, result: &str) {
    metrics::counter!(
        METRIC_COMPONENT_STARTUP,
        "component" => component.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_component_shutdown(component: &str, result: &str) {
    metrics::counter!(
        METRIC_COMPONENT_SHUTDOWN,
        "component" => component.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_readiness_check(failed: bool) {
    let result = if failed { "failed" } else { "ok" };
    metrics::counter!(METRIC_READINESS_CHECKS, "result" => result).increment(1);
}

pub(crate) fn emit_failure_streak(streak: i64) {
    metrics::gauge!(METRIC_READINESS_FAILURE_STREAK).set(streak as f64);
}
