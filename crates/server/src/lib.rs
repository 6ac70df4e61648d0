//! Babel server library.
//!
//! Provides a reusable server function to serve Babel either for the binary, or for the integration tests.

#![deny(missing_docs)]

mod cors;
mod health;

use std::{net::SocketAddr, sync::Arc};

use anyhow::anyhow;
use axum::{Router, routing::get};
use axum_server::tls_rustls::RustlsConfig;
use config::Config;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use translate::{HistorySink, SecretSource};

/// Configuration for serving Babel.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Babel TOML configuration.
    pub config: Config,
    /// Where built-in service secrets are read from. The process environment if not set.
    pub secrets: Option<Arc<dyn SecretSource>>,
    /// Receives finished translations. They are logged if not set.
    pub history: Option<Arc<dyn HistorySink>>,
}

/// Starts and runs the Babel server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        secrets,
        history,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let mut app = Router::new();

    let cors = if let Some(cors_config) = &config.server.cors {
        cors::generate(cors_config)
    } else {
        CorsLayer::permissive()
    };

    let mut translate_exposed = false;

    if config.translate.enabled() {
        let mut builder = translate::RouterConfig::builder(config.translate.clone());

        if let Some(secrets) = secrets {
            builder = builder.secrets(secrets);
        }

        if let Some(history) = history {
            builder = builder.history(history);
        }

        match translate::router(builder.build()) {
            Ok(translate_router) => {
                app = app.merge(translate_router.layer(cors.clone()));
                translate_exposed = true;
            }
            Err(e) => {
                log::error!("Failed to initialize translation router: {e}");
            }
        }
    } else {
        log::debug!("Translation is disabled - translation endpoint will not be exposed");
    }

    if config.server.health.enabled {
        if let Some(listen) = config.server.health.listen {
            tokio::spawn(health::bind_health_endpoint(
                listen,
                config.server.tls.clone(),
                config.server.health.clone(),
            ));
        } else {
            let health_router = Router::new()
                .route(&config.server.health.path, get(health::health))
                .layer(cors.clone());

            app = app.merge(health_router);
        }
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if !translate_exposed {
        log::warn!("Server starting with no functional endpoints. Enable translation to serve requests.");
    }

    match &config.server.tls {
        Some(tls_config) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key)
                .await
                .map_err(|e| anyhow!("Failed to load TLS certificate and key: {e}"))?;

            if translate_exposed {
                log::info!(
                    "Translation endpoint available at: https://{listen_address}{}",
                    config.translate.path
                );
            }

            axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)
                .serve(app.into_make_service())
                .await
                .map_err(|e| anyhow!("Failed to start HTTPS server: {e}"))?;
        }
        None => {
            if translate_exposed {
                log::info!(
                    "Translation endpoint available at: http://{listen_address}{}",
                    config.translate.path
                );
            }

            axum::serve(listener, app)
                .await
                .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;
        }
    }

    Ok(())
}
