//! Babel configuration structures to map the babel.toml configuration.

#![deny(missing_docs)]

mod cors;
mod health;
mod loader;
mod server;
mod tls;
mod translate;

use std::path::Path;

pub use cors::*;
pub use health::HealthConfig;
use serde::Deserialize;
pub use server::ServerConfig;
pub use tls::TlsServerConfig;
pub use translate::{
    CUSTOM_SERVICE_PREFIX, CustomEndpointConfig, FixedJsonDialect, FixedJsonServiceConfig, ServiceConfig,
    StreamingChatServiceConfig, TimeoutConfig, TranslateConfig,
};

/// Main configuration structure for the Babel application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Translation aggregator configuration settings.
    #[serde(default)]
    pub translate: TranslateConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates that the configuration can serve translations.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}
