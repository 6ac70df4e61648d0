use std::net::SocketAddr;

use anyhow::anyhow;
use axum::{Json, Router, routing::get};
use axum_server::tls_rustls::RustlsConfig;
use config::{HealthConfig, TlsServerConfig};
use http::StatusCode;

#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub(crate) enum HealthState {
    /// The server accepts translation requests.
    Healthy,
}

/// Reports that the server is up. Backend availability is not checked.
pub(crate) async fn health() -> (StatusCode, Json<HealthState>) {
    (StatusCode::OK, Json(HealthState::Healthy))
}

/// Serves the health endpoint on its own listener.
pub(super) async fn bind_health_endpoint(
    addr: SocketAddr,
    tls_config: Option<TlsServerConfig>,
    health_config: HealthConfig,
) -> anyhow::Result<()> {
    let path = &health_config.path;
    let app = Router::new().route(path, get(health)).into_make_service();

    let Some(tls) = tls_config else {
        log::info!("Health check endpoint exposed at http://{addr}{path}");

        return axum_server::bind(addr)
            .serve(app)
            .await
            .map_err(|e| anyhow!("Failed to start HTTP server in the health endpoint: {e}"));
    };

    let rustls_config = RustlsConfig::from_pem_file(&tls.certificate, &tls.key)
        .await
        .map_err(|e| anyhow!("Failed to load TLS certificate and key: {e}"))?;

    log::info!("Health check endpoint exposed at https://{addr}{path}");

    axum_server::bind_rustls(addr, rustls_config)
        .serve(app)
        .await
        .map_err(|e| anyhow!("Failed to start HTTPS server in the health endpoint: {e}"))
}
