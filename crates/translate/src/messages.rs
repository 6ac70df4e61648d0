use std::sync::Arc;

use itertools::Itertools;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::TranslateError;

/// Language code meaning "let the backend detect the source language".
pub(crate) const AUTO_LANGUAGE: &str = "auto";

/// One translation request, fanned out to every listed service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TranslateRequest {
    #[serde(default)]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) source_lang: String,
    #[serde(default)]
    pub(crate) target_lang: String,
    #[serde(default)]
    pub(crate) services: Vec<String>,
    #[serde(default, rename = "customAPIs")]
    pub(crate) custom_apis: Vec<CustomApi>,
}

impl TranslateRequest {
    /// Rejects requests that cannot produce a translation for any service.
    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.text.trim().is_empty() {
            return Err(TranslateError::InvalidRequest("text must not be empty".to_string()));
        }

        if self.target_lang.trim().is_empty() {
            return Err(TranslateError::InvalidRequest("targetLang must not be empty".to_string()));
        }

        if self.services.is_empty() {
            return Err(TranslateError::InvalidRequest(
                "at least one service must be selected".to_string(),
            ));
        }

        if let Some(invalid) = self
            .services
            .iter()
            .find(|id| id.is_empty() || id.chars().any(char::is_control))
        {
            return Err(TranslateError::InvalidRequest(format!(
                "invalid service id {invalid:?}"
            )));
        }

        Ok(())
    }

    /// The requested service ids in request order, each at most once.
    pub(crate) fn service_ids(&self) -> Vec<String> {
        self.services.iter().unique().cloned().collect()
    }

    /// Source language with an empty value meaning [`AUTO_LANGUAGE`].
    pub(crate) fn source_lang(&self) -> &str {
        match self.source_lang.trim() {
            "" => AUTO_LANGUAGE,
            lang => lang,
        }
    }
}

/// A caller-supplied OpenAI-compatible endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomApi {
    /// Service id, always prefixed with `custom_`.
    pub id: String,
    /// Display name chosen by the caller.
    #[serde(default)]
    pub name: String,
    /// Full URL of the chat completions endpoint.
    pub endpoint: String,
    /// Key sent as a bearer token. Scoped to the request, never stored or logged.
    pub api_key: SecretString,
    /// Model identifier sent with the request.
    pub model: String,
}

/// The unit of work handed to one backend adapter.
#[derive(Debug, Clone)]
pub(crate) struct TranslationJob {
    pub(crate) text: Arc<str>,
    pub(crate) source_lang: Arc<str>,
    pub(crate) target_lang: Arc<str>,
    pub(crate) service_id: String,
}

impl TranslationJob {
    pub(crate) fn source_is_auto(&self) -> bool {
        self.source_lang.eq_ignore_ascii_case(AUTO_LANGUAGE)
    }

    /// The instruction sent to chat-completion backends.
    pub(crate) fn prompt(&self) -> String {
        if self.source_is_auto() {
            format!(
                "Translate the following text into {}. Reply with the translation only, without any explanation.\n\n{}",
                self.target_lang, self.text
            )
        } else {
            format!(
                "Translate the following text from {} into {}. Reply with the translation only, without any explanation.\n\n{}",
                self.source_lang, self.target_lang, self.text
            )
        }
    }
}
