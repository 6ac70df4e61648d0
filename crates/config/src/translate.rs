//! Translation service configuration: built-in backends, custom endpoint policy and timeouts.

use std::{borrow::Cow, collections::BTreeMap, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;
use url::Url;

use crate::AnyOrUrlArray;

/// Prefix marking a service id as caller-supplied rather than configured in the server.
pub const CUSTOM_SERVICE_PREFIX: &str = "custom_";

/// Translation aggregator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslateConfig {
    /// Whether the translation endpoint is enabled.
    enabled: bool,

    /// The path where the translation endpoint is mounted.
    pub path: Cow<'static, str>,

    /// Timeouts applied to every backend call.
    pub timeouts: TimeoutConfig,

    /// Which caller-supplied endpoints the server is allowed to call.
    pub custom_endpoints: CustomEndpointConfig,

    /// Built-in services, keyed by service id.
    pub services: BTreeMap<String, ServiceConfig>,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Cow::Borrowed("/translate"),
            timeouts: TimeoutConfig::default(),
            custom_endpoints: CustomEndpointConfig::default(),
            services: builtin_services(),
        }
    }
}

impl TranslateConfig {
    /// Whether the translation endpoint is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether there are any built-in services configured.
    pub fn has_services(&self) -> bool {
        !self.services.is_empty()
    }
}

/// Per-call timeouts for backend requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Maximum time to establish a connection to a backend.
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect: Duration,
    /// Maximum time between sending a request and receiving the response headers.
    #[serde(deserialize_with = "deserialize_duration")]
    pub first_byte: Duration,
    /// Maximum gap between two reads of a response body.
    #[serde(deserialize_with = "deserialize_duration")]
    pub idle: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            first_byte: Duration::from_secs(30),
            idle: Duration::from_secs(30),
        }
    }
}

/// Policy for endpoints supplied by callers in `customAPIs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CustomEndpointConfig {
    /// Origins custom endpoints may point at. `"*"` allows any HTTPS endpoint.
    /// Empty by default: no custom endpoint is reachable until configured.
    pub allowed_origins: AnyOrUrlArray,
}

/// A built-in translation backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ServiceConfig {
    /// A backend answering with one complete JSON document.
    FixedJson(FixedJsonServiceConfig),

    /// A chat-completion backend streaming its answer as server-sent events.
    StreamingChat(StreamingChatServiceConfig),
}

impl ServiceConfig {
    /// The endpoint the service posts to.
    pub fn endpoint(&self) -> &Url {
        match self {
            Self::FixedJson(config) => &config.endpoint,
            Self::StreamingChat(config) => &config.endpoint,
        }
    }

    /// Name of the environment variable holding the service secret.
    pub fn api_key_env(&self) -> &str {
        match self {
            Self::FixedJson(config) => &config.api_key_env,
            Self::StreamingChat(config) => &config.api_key_env,
        }
    }

    /// The model identifier, if the backend takes one.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::FixedJson(config) => config.model.as_deref(),
            Self::StreamingChat(config) => Some(&config.model),
        }
    }
}

/// Configuration of a non-streaming JSON backend.
#[derive(Debug, Clone, Deserialize)]
pub struct FixedJsonServiceConfig {
    /// Request and response shape of the backend.
    pub dialect: FixedJsonDialect,

    /// Full URL of the translation endpoint.
    pub endpoint: Url,

    /// Model identifier, only used by chat-completion backends.
    #[serde(default)]
    pub model: Option<String>,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

/// Request and response shapes understood by the fixed JSON adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixedJsonDialect {
    /// OpenAI-style chat completion with `stream: false`.
    ChatCompletion,
    /// DeepL v2 translate API.
    Deepl,
    /// Google Cloud Translation v2 API.
    Google,
}

/// Configuration of a streaming chat-completion backend.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamingChatServiceConfig {
    /// Full URL of the chat completions endpoint.
    pub endpoint: Url,

    /// Model identifier sent with every request.
    pub model: String,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

fn builtin_services() -> BTreeMap<String, ServiceConfig> {
    let mut services = BTreeMap::new();

    services.insert(
        "openai".to_string(),
        ServiceConfig::StreamingChat(StreamingChatServiceConfig {
            endpoint: builtin_url("https://api.openai.com/v1/chat/completions"),
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }),
    );

    services.insert(
        "tongyi".to_string(),
        ServiceConfig::StreamingChat(StreamingChatServiceConfig {
            endpoint: builtin_url("https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"),
            model: "qwen-turbo".to_string(),
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
        }),
    );

    services.insert(
        "deepl".to_string(),
        ServiceConfig::FixedJson(FixedJsonServiceConfig {
            dialect: FixedJsonDialect::Deepl,
            endpoint: builtin_url("https://api-free.deepl.com/v2/translate"),
            model: None,
            api_key_env: "DEEPL_API_KEY".to_string(),
        }),
    );

    services.insert(
        "google".to_string(),
        ServiceConfig::FixedJson(FixedJsonServiceConfig {
            dialect: FixedJsonDialect::Google,
            endpoint: builtin_url("https://translation.googleapis.com/language/translate/v2"),
            model: None,
            api_key_env: "GOOGLE_TRANSLATE_API_KEY".to_string(),
        }),
    );

    services
}

fn builtin_url(url: &str) -> Url {
    Url::parse(url).expect("built-in service URLs are valid")
}
