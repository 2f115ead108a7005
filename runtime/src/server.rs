use std::future::Future;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::RuntimeError;
use crate::runtime::Runtime;

/// Start the components, serve `app` behind the runtime until `shutdown`
/// resolves, then shut the components down.
///
/// A startup failure aborts before anything is served. Component shutdown
/// errors are logged, not returned.
pub async fn serve<F>(
    runtime: Runtime,
    app: Router,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), RuntimeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("listening on {:?}", listener.local_addr()?);

    // Handed to startup, cancelled once the server stops.
    let lifetime = CancellationToken::new();
    runtime.startup(&lifetime).await?;

    let router = runtime.router(app);
    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await;
    lifetime.cancel();

    if let Err(e) = runtime.shutdown(&CancellationToken::new()).await {
        error!(error = %e, "Runtime: component shutdown failed");
    }

    served?;
    Ok(())
}

/// Resolves on SIGTERM or SIGINT.
pub async fn shutdown_signal() {
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to register SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = terminate => {},
        _ = interrupt => {},
    }
    info!("Shutdown signal received");
}
