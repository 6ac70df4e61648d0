use std::path::Path;

use anyhow::bail;
use indoc::indoc;

use crate::{AnyOrArray, CUSTOM_SERVICE_PREFIX, Config, FixedJsonDialect, ServiceConfig};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&content)?;

    validate(&config)?;

    for warning in collect_warnings(&config) {
        log::warn!("{warning}");
    }

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    let translate = &config.translate;

    if !translate.enabled() {
        return Ok(());
    }

    let custom_endpoints_allowed = match &translate.custom_endpoints.allowed_origins {
        AnyOrArray::Any => true,
        AnyOrArray::Explicit(origins) => !origins.is_empty(),
    };

    if !translate.has_services() && !custom_endpoints_allowed {
        bail!(indoc! {r#"
            No translation services configured. Babel requires at least one built-in service or an allow-list for custom endpoints.

            Example configuration:

            For built-in services:

              [translate.services.openai]
              type = "streaming-chat"
              endpoint = "https://api.openai.com/v1/chat/completions"
              model = "gpt-3.5-turbo"
              api_key_env = "OPENAI_API_KEY"

            For custom endpoints:

              [translate.custom_endpoints]
              allowed_origins = ["https://api.example.com"]
        "#});
    }

    for (id, service) in &translate.services {
        if id.is_empty() || id.chars().any(char::is_control) {
            bail!("Service id {id:?} must be non-empty and must not contain control characters");
        }

        if id.starts_with(CUSTOM_SERVICE_PREFIX) {
            bail!("Service id '{id}' uses the reserved prefix '{CUSTOM_SERVICE_PREFIX}' for caller-supplied services");
        }

        let scheme = service.endpoint().scheme();
        if scheme != "http" && scheme != "https" {
            bail!("Service '{id}' has an endpoint with unsupported scheme '{scheme}'");
        }

        if service.api_key_env().is_empty() {
            bail!("Service '{id}' must name the environment variable holding its API key");
        }

        if let ServiceConfig::FixedJson(fixed) = service
            && fixed.dialect == FixedJsonDialect::ChatCompletion
            && fixed.model.is_none()
        {
            bail!("Service '{id}' uses the chat-completion dialect and must configure a model");
        }
    }

    Ok(())
}

fn collect_warnings(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    for (id, service) in &config.translate.services {
        if service.endpoint().scheme() == "http" {
            warnings.push(format!(
                "Service '{id}' sends its API key over plain HTTP to {}",
                service.endpoint()
            ));
        }
    }

    if config.translate.custom_endpoints.allowed_origins == AnyOrArray::Any {
        warnings.push("Custom endpoints are allowed to call any HTTPS origin".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;
    use insta::assert_snapshot;

    use crate::Config;

    fn parse(config: &str) -> Config {
        toml::from_str(config).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(super::validate(&config).is_ok());
    }

    #[test]
    fn no_services_and_no_custom_endpoints() {
        let config = parse(indoc! {r#"
            [translate]
            services = {}
        "#});

        let error = super::validate(&config).unwrap_err().to_string();

        assert_snapshot!(error, @r#"
        No translation services configured. Babel requires at least one built-in service or an allow-list for custom endpoints.

        Example configuration:

        For built-in services:

          [translate.services.openai]
          type = "streaming-chat"
          endpoint = "https://api.openai.com/v1/chat/completions"
          model = "gpt-3.5-turbo"
          api_key_env = "OPENAI_API_KEY"

        For custom endpoints:

          [translate.custom_endpoints]
          allowed_origins = ["https://api.example.com"]
        "#);
    }

    #[test]
    fn custom_endpoints_only() {
        let config = parse(indoc! {r#"
            [translate]
            services = {}

            [translate.custom_endpoints]
            allowed_origins = ["https://api.example.com"]
        "#});

        assert!(super::validate(&config).is_ok());
    }

    #[test]
    fn disabled_translation_skips_validation() {
        let config = parse(indoc! {r#"
            [translate]
            enabled = false
            services = {}
        "#});

        assert!(super::validate(&config).is_ok());
    }

    #[test]
    fn reserved_prefix() {
        let config = parse(indoc! {r#"
            [translate.services.custom_openai]
            type = "streaming-chat"
            endpoint = "https://api.openai.com/v1/chat/completions"
            model = "gpt-4o-mini"
            api_key_env = "OPENAI_API_KEY"
        "#});

        let error = super::validate(&config).unwrap_err().to_string();

        assert_snapshot!(error, @"Service id 'custom_openai' uses the reserved prefix 'custom_' for caller-supplied services");
    }

    #[test]
    fn unsupported_scheme() {
        let config = parse(indoc! {r#"
            [translate.services.ftp]
            type = "streaming-chat"
            endpoint = "ftp://example.com/chat"
            model = "m"
            api_key_env = "KEY"
        "#});

        let error = super::validate(&config).unwrap_err().to_string();

        assert_snapshot!(error, @"Service 'ftp' has an endpoint with unsupported scheme 'ftp'");
    }

    #[test]
    fn chat_completion_dialect_requires_model() {
        let config = parse(indoc! {r#"
            [translate.services.gpt]
            type = "fixed-json"
            dialect = "chat-completion"
            endpoint = "https://api.openai.com/v1/chat/completions"
            api_key_env = "OPENAI_API_KEY"
        "#});

        let error = super::validate(&config).unwrap_err().to_string();

        assert_snapshot!(error, @"Service 'gpt' uses the chat-completion dialect and must configure a model");
    }

    #[test]
    fn plain_http_warning() {
        let config = parse(indoc! {r#"
            [translate.services.local]
            type = "streaming-chat"
            endpoint = "http://127.0.0.1:11434/v1/chat/completions"
            model = "qwen2.5"
            api_key_env = "LOCAL_KEY"
        "#});

        let warnings = super::collect_warnings(&config);

        assert_eq!(
            warnings,
            ["Service 'local' sends its API key over plain HTTP to http://127.0.0.1:11434/v1/chat/completions"]
        );
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();

        write!(
            file,
            "{}",
            indoc! {r#"
                [server]
                listen_address = "0.0.0.0:9000"

                [translate.custom_endpoints]
                allowed_origins = ["https://allowed.example"]
            "#}
        )
        .unwrap();

        let config = super::load(file.path()).unwrap();

        assert_eq!(config.server.listen_address.unwrap().port(), 9000);
        assert_eq!(config.translate.services.len(), 4);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[translate]\npath = 12").unwrap();

        assert!(super::load(file.path()).is_err());
    }
}
