use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use service_runtime::config::Config;
use service_runtime::server::{serve, shutdown_signal};
use service_runtime::Runtime;

async fn index() -> &'static str {
    "service runtime"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env().expect("Invalid configuration:");

    // stdout with a level configured by the RUST_LOG envvar (default=INFO)
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    );
    tracing_subscriber::registry().with(log_layer).init();

    let mut options = config.runtime_options();
    if config.export_prometheus {
        let handle = common_metrics::setup_metrics_recorder()
            .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;
        options = options.with_metrics_handle(handle);
    }
    let runtime = Runtime::new(options);

    let app = Router::new().route("/", get(index));

    let listener = tokio::net::TcpListener::bind(config.bind()).await?;
    serve(runtime, app, listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
