//! Health endpoint configuration.

use std::{borrow::Cow, net::SocketAddr};

use serde::Deserialize;

/// Health endpoint configuration.
///
/// The endpoint only reports that the server is up. Translation backends are not probed,
/// so a health check never spends API quota.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the health endpoint is enabled.
    pub enabled: bool,
    /// A separate socket address for the health endpoint, keeping it off the public listener.
    pub listen: Option<SocketAddr>,
    /// The path for the health endpoint.
    pub path: Cow<'static, str>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            enabled: true,
            listen: None,
            path: Cow::Borrowed("/health"),
        }
    }
}
