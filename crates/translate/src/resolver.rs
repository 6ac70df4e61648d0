use std::{collections::BTreeMap, sync::Arc};

use config::{CUSTOM_SERVICE_PREFIX, ServiceConfig};
use secrecy::{ExposeSecret, SecretString};

use crate::{
    error::ConfigurationError,
    messages::CustomApi,
    target::{BuiltInProtocol, BuiltInTarget, CustomTarget, ServiceTarget},
};

/// Where built-in service secrets come from.
///
/// A missing secret is an expected condition and is reported per service.
pub trait SecretSource: Send + Sync {
    /// Looks up the secret stored under `key`.
    fn get(&self, key: &str) -> Option<SecretString>;
}

/// Reads secrets from the process environment. Empty values count as missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn get(&self, key: &str) -> Option<SecretString> {
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(SecretString::from)
    }
}

/// Maps service ids to backend targets.
pub(crate) struct ConfigResolver {
    services: BTreeMap<String, ServiceConfig>,
    secrets: Arc<dyn SecretSource>,
}

impl ConfigResolver {
    pub(crate) fn new(services: BTreeMap<String, ServiceConfig>, secrets: Arc<dyn SecretSource>) -> Self {
        Self { services, secrets }
    }

    /// Resolves one service id. Independent per id: one failure never affects another id.
    pub(crate) fn resolve(
        &self,
        service_id: &str,
        custom_apis: &[CustomApi],
    ) -> Result<ServiceTarget, ConfigurationError> {
        if service_id.starts_with(CUSTOM_SERVICE_PREFIX) {
            return resolve_custom(service_id, custom_apis);
        }

        let Some(service) = self.services.get(service_id) else {
            return Err(ConfigurationError::UnknownService(service_id.to_string()));
        };

        let key = service.api_key_env();

        let Some(api_key) = self.secrets.get(key) else {
            return Err(ConfigurationError::MissingSecret {
                service_id: service_id.to_string(),
                key: key.to_string(),
            });
        };

        let protocol = match service {
            ServiceConfig::FixedJson(config) => BuiltInProtocol::FixedJson(config.dialect),
            ServiceConfig::StreamingChat(_) => BuiltInProtocol::StreamingChat,
        };

        Ok(ServiceTarget::BuiltIn(BuiltInTarget {
            service_id: service_id.to_string(),
            endpoint: service.endpoint().clone(),
            model: service.model().map(str::to_string),
            secret_env_var: key.to_string(),
            api_key,
            protocol,
        }))
    }
}

fn resolve_custom(service_id: &str, custom_apis: &[CustomApi]) -> Result<ServiceTarget, ConfigurationError> {
    let Some(api) = custom_apis.iter().find(|api| api.id == service_id) else {
        return Err(ConfigurationError::UnknownCustomService(service_id.to_string()));
    };

    if api.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigurationError::MissingSecret {
            service_id: service_id.to_string(),
            key: "apiKey".to_string(),
        });
    }

    Ok(ServiceTarget::Custom(CustomTarget {
        id: api.id.clone(),
        name: api.name.clone(),
        endpoint: api.endpoint.clone(),
        api_key: api.api_key.clone(),
        model: api.model.clone(),
    }))
}
