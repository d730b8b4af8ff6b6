//! API server lifecycle.

use axum::Router;
use coriolis_config::ApiServerConfig;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Grace period for in-flight requests after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bind and serve the API until the token is cancelled, then allow
/// in-flight requests [`SHUTDOWN_GRACE`] to finish.
pub async fn serve(
    cfg: &ApiServerConfig,
    router: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let addr = format!("{}:{}", cfg.bind, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "api server listening");

    let shutdown = cancel.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    });

    tokio::select! {
        result = server => result,
        _ = async {
            cancel.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            info!("shutdown grace period elapsed, closing remaining connections");
            Ok(())
        }
    }
}
