use config::FixedJsonDialect;
use secrecy::SecretString;
use url::Url;

use crate::adapter::AdapterKind;

/// A fully resolved backend for one service, including its secret.
///
/// Targets are built per job and moved into the task serving that job.
#[derive(Debug, Clone)]
pub enum ServiceTarget {
    /// A service configured in the server.
    BuiltIn(BuiltInTarget),
    /// A service supplied by the caller in `customAPIs`.
    Custom(CustomTarget),
}

impl ServiceTarget {
    /// The id the caller used to select this service.
    pub fn service_id(&self) -> &str {
        match self {
            Self::BuiltIn(target) => &target.service_id,
            Self::Custom(target) => &target.id,
        }
    }

    pub(crate) fn adapter_kind(&self) -> AdapterKind {
        match self {
            Self::BuiltIn(BuiltInTarget {
                protocol: BuiltInProtocol::FixedJson(_),
                ..
            }) => AdapterKind::FixedJson,
            Self::BuiltIn(BuiltInTarget {
                protocol: BuiltInProtocol::StreamingChat,
                ..
            }) => AdapterKind::StreamingChat,
            Self::Custom(_) => AdapterKind::CustomStreamingChat,
        }
    }
}

/// How a built-in backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltInProtocol {
    /// One request, one complete JSON answer.
    FixedJson(FixedJsonDialect),
    /// Chat completions streamed as server-sent events.
    StreamingChat,
}

/// A server-configured backend.
#[derive(Debug, Clone)]
pub struct BuiltInTarget {
    /// Service id from the configuration.
    pub service_id: String,
    /// Endpoint fixed by the configuration.
    pub endpoint: Url,
    /// Model identifier, when the backend takes one.
    pub model: Option<String>,
    /// Environment variable the secret was read from.
    pub secret_env_var: String,
    /// The secret itself.
    pub api_key: SecretString,
    /// Request and response shape of the backend.
    pub protocol: BuiltInProtocol,
}

/// A caller-supplied backend.
#[derive(Debug, Clone)]
pub struct CustomTarget {
    /// Service id, prefixed with `custom_`.
    pub id: String,
    /// Display name chosen by the caller.
    pub name: String,
    /// Endpoint as given by the caller, validated by the endpoint policy before use.
    pub endpoint: String,
    /// Request-scoped key.
    pub api_key: SecretString,
    /// Model identifier.
    pub model: String,
}
