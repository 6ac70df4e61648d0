//! Multi-backend streaming translation.
//!
//! One request fans out to every selected service; each service's output is relayed to the
//! client as soon as it arrives, tagged with the service id, over a single event stream.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    response::IntoResponse,
    routing::post,
};
use config::TranslateConfig;

mod adapter;
mod chunk;
mod error;
mod history;
mod messages;
mod policy;
mod resolver;
mod session;
mod sse;
mod target;

pub use error::{ConfigurationError, SecurityError, TranslateError};
pub use history::{HistoryRecord, HistorySink, LogHistory};
pub use messages::CustomApi;
pub use policy::{AllowListPolicy, EndpointPolicy};
pub use resolver::{EnvSecrets, SecretSource};
pub use target::{BuiltInProtocol, BuiltInTarget, CustomTarget, ServiceTarget};

use adapter::Adapters;
use messages::TranslateRequest;
use resolver::ConfigResolver;
use session::Aggregator;

pub(crate) type Result<T> = std::result::Result<T, TranslateError>;

/// Configuration for creating the translation router.
pub struct RouterConfig {
    /// The translation configuration.
    pub config: TranslateConfig,
    /// Where built-in service secrets are read from.
    pub secrets: Arc<dyn SecretSource>,
    /// Receives every finished translation.
    pub history: Arc<dyn HistorySink>,
    /// Decides which endpoints may be called. Defaults to the configured allow-list.
    pub endpoint_policy: Option<Arc<dyn EndpointPolicy>>,
}

impl RouterConfig {
    /// Create a new router configuration builder.
    pub fn builder(config: TranslateConfig) -> RouterConfigBuilder {
        RouterConfigBuilder {
            config,
            secrets: None,
            history: None,
            endpoint_policy: None,
        }
    }
}

/// Builder for creating router configuration.
pub struct RouterConfigBuilder {
    config: TranslateConfig,
    secrets: Option<Arc<dyn SecretSource>>,
    history: Option<Arc<dyn HistorySink>>,
    endpoint_policy: Option<Arc<dyn EndpointPolicy>>,
}

impl RouterConfigBuilder {
    /// Set the secret source. The process environment is used otherwise.
    pub fn secrets(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Set the history sink. Finished translations are logged otherwise.
    pub fn history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    /// Replace the allow-list from the configuration with another policy.
    pub fn endpoint_policy(mut self, policy: Arc<dyn EndpointPolicy>) -> Self {
        self.endpoint_policy = Some(policy);
        self
    }

    /// Build the router configuration.
    pub fn build(self) -> RouterConfig {
        RouterConfig {
            config: self.config,
            secrets: self.secrets.unwrap_or_else(|| Arc::new(EnvSecrets)),
            history: self.history.unwrap_or_else(|| Arc::new(LogHistory)),
            endpoint_policy: self.endpoint_policy,
        }
    }
}

/// Creates an axum router for the translation endpoint.
pub fn router(router_config: RouterConfig) -> anyhow::Result<Router> {
    let RouterConfig {
        config,
        secrets,
        history,
        endpoint_policy,
    } = router_config;

    let adapters = Adapters::new(&config.timeouts)?;

    for (service_id, service) in &config.services {
        let key = service.api_key_env();

        if secrets.get(key).is_none() {
            log::warn!("Service '{service_id}' has no API key ({key} is not set), requests selecting it will fail");
        }
    }

    let policy = endpoint_policy.unwrap_or_else(|| Arc::new(AllowListPolicy::new(&config.custom_endpoints)));

    let aggregator = Aggregator::new(
        ConfigResolver::new(config.services, secrets),
        policy,
        adapters,
        history,
    );

    Ok(Router::new()
        .route(&config.path, post(translate))
        .with_state(aggregator))
}

/// Handle translation requests.
///
/// Invalid requests are rejected with a JSON error before anything is streamed. Otherwise the
/// response is an event stream carrying every selected service's output and terminal event.
async fn translate(
    State(aggregator): State<Aggregator>,
    request: std::result::Result<Json<TranslateRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(request) = request.map_err(|rejection| TranslateError::InvalidRequest(rejection.body_text()))?;
    request.validate()?;

    log::info!("Translation requested from {} service(s)", request.service_ids().len());
    log::debug!(
        "Translating from {} to {}",
        request.source_lang(),
        request.target_lang.trim()
    );

    let chunks = aggregator.dispatch(request);

    Ok(sse::into_sse(chunks))
}
