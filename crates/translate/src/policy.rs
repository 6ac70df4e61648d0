use config::{AnyOrArray, CustomEndpointConfig};
use url::{Origin, Url};

use crate::{error::SecurityError, target::ServiceTarget};

/// Decides whether the server may call a target's endpoint.
///
/// Runs after resolution and before any network traffic for the target.
pub trait EndpointPolicy: Send + Sync {
    /// Returns an error if the target's endpoint must not be called.
    fn authorize(&self, target: &ServiceTarget) -> Result<(), SecurityError>;
}

/// Built-in endpoints come from the server configuration and are always allowed. Custom
/// endpoints must match a configured origin, or use https when any origin is allowed.
pub struct AllowListPolicy {
    allowed: AllowedOrigins,
}

enum AllowedOrigins {
    Any,
    Explicit(Vec<Origin>),
}

impl AllowListPolicy {
    pub fn new(config: &CustomEndpointConfig) -> Self {
        let allowed = match &config.allowed_origins {
            AnyOrArray::Any => AllowedOrigins::Any,
            AnyOrArray::Explicit(urls) => AllowedOrigins::Explicit(urls.iter().map(Url::origin).collect()),
        };

        Self { allowed }
    }
}

impl EndpointPolicy for AllowListPolicy {
    fn authorize(&self, target: &ServiceTarget) -> Result<(), SecurityError> {
        let ServiceTarget::Custom(custom) = target else {
            return Ok(());
        };

        let deny = |reason: &str| SecurityError::UnauthorizedEndpoint {
            service_id: custom.id.clone(),
            reason: reason.to_string(),
        };

        let url = Url::parse(&custom.endpoint).map_err(|_| deny("endpoint is not a valid URL"))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(deny("only http and https endpoints can be called"));
        }

        if !url.username().is_empty() || url.password().is_some() {
            return Err(deny("endpoint must not contain credentials"));
        }

        match &self.allowed {
            AllowedOrigins::Any if url.scheme() == "https" => Ok(()),
            AllowedOrigins::Any => Err(deny("only https endpoints are allowed")),
            AllowedOrigins::Explicit(origins) if origins.contains(&url.origin()) => Ok(()),
            AllowedOrigins::Explicit(_) => Err(deny("origin is not in the allowed list")),
        }
    }
}
