use envconfig::Envconfig;

use crate::runtime::RuntimeOptions;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3000")]
    pub port: u16,

    // <= 0 disables the admission gate
    #[envconfig(default = "128")]
    pub concurrency: i64,

    // <= 0 disables cascading readiness failures into liveness
    #[envconfig(default = "5")]
    pub readiness_cascade: i64,

    #[envconfig(default = "/debug/ready")]
    pub readiness_path: String,

    #[envconfig(default = "/debug/alive")]
    pub liveness_path: String,

    #[envconfig(default = "/debug/metrics")]
    pub metrics_path: String,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Runtime options from this config. The metrics handle and debug routes
    /// are process wiring and get added by the caller.
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions::default()
            .with_concurrency(self.concurrency)
            .with_readiness_cascade(self.readiness_cascade)
            .with_readiness_path(&self.readiness_path)
            .with_liveness_path(&self.liveness_path)
            .with_metrics_path(&self.metrics_path)
    }
}
