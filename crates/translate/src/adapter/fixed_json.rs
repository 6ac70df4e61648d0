use async_trait::async_trait;
use config::FixedJsonDialect;
use reqwest::header::AUTHORIZATION;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{
    BackendAdapter, Http,
    chat::{self, ChatRequest, ChatResponse},
};
use crate::{
    chunk::ChunkSink,
    error::ServiceError,
    messages::TranslationJob,
    target::{BuiltInProtocol, BuiltInTarget, ServiceTarget},
};

const GOOGLE_API_KEY_HEADER: &str = "X-goog-api-key";

/// Backends answering with one complete JSON document. Emits exactly one text chunk.
pub(super) struct FixedJsonAdapter {
    http: Http,
}

impl FixedJsonAdapter {
    pub(super) fn new(http: Http) -> Self {
        Self { http }
    }

    async fn chat_completion(&self, job: &TranslationJob, target: &BuiltInTarget) -> Result<String, ServiceError> {
        let Some(model) = target.model.as_deref() else {
            return Err(ServiceError::Internal(format!(
                "service '{}' has no model configured",
                target.service_id
            )));
        };

        let body = ChatRequest::new(model, job, false);
        let request = chat::request(&self.http, target.endpoint.clone(), &target.api_key, &body);

        let response = self.http.send(request).await?;
        let body = self.http.read_body(response).await?;

        let completion: ChatResponse = sonic_rs::from_str(&body)
            .map_err(|_| ServiceError::UpstreamResponse("body is not a chat completion".to_string()))?;

        completion
            .into_content()
            .ok_or_else(|| ServiceError::UpstreamResponse("completion has no content".to_string()))
    }

    async fn deepl(&self, job: &TranslationJob, target: &BuiltInTarget) -> Result<String, ServiceError> {
        let body = DeeplRequest {
            text: [job.text.as_ref()],
            target_lang: job.target_lang.to_uppercase(),
            source_lang: (!job.source_is_auto()).then(|| job.source_lang.to_uppercase()),
        };

        let request = self
            .http
            .client()
            .post(target.endpoint.clone())
            .header(AUTHORIZATION, format!("DeepL-Auth-Key {}", target.api_key.expose_secret()))
            .json(&body);

        let response = self.http.send(request).await?;
        let body = self.http.read_body(response).await?;

        let response: DeeplResponse = sonic_rs::from_str(&body)
            .map_err(|_| ServiceError::UpstreamResponse("body is not a DeepL translation".to_string()))?;

        Ok(response
            .translations
            .into_iter()
            .next()
            .map(|translation| translation.text)
            .unwrap_or_default())
    }

    async fn google(&self, job: &TranslationJob, target: &BuiltInTarget) -> Result<String, ServiceError> {
        let body = GoogleRequest {
            q: job.text.as_ref(),
            target: job.target_lang.as_ref(),
            source: (!job.source_is_auto()).then_some(&*job.source_lang),
            format: "text",
        };

        let request = self
            .http
            .client()
            .post(target.endpoint.clone())
            .header(GOOGLE_API_KEY_HEADER, target.api_key.expose_secret())
            .json(&body);

        let response = self.http.send(request).await?;
        let body = self.http.read_body(response).await?;

        let response: GoogleResponse = sonic_rs::from_str(&body)
            .map_err(|_| ServiceError::UpstreamResponse("body is not a Google translation".to_string()))?;

        Ok(response
            .data
            .translations
            .into_iter()
            .next()
            .map(|translation| translation.translated_text)
            .unwrap_or_default())
    }
}

#[async_trait]
impl BackendAdapter for FixedJsonAdapter {
    async fn run(
        &self,
        job: &TranslationJob,
        target: &ServiceTarget,
        sink: &mut ChunkSink,
    ) -> Result<(), ServiceError> {
        let ServiceTarget::BuiltIn(
            target @ BuiltInTarget {
                protocol: BuiltInProtocol::FixedJson(dialect),
                ..
            },
        ) = target
        else {
            return Err(ServiceError::Internal(format!(
                "{} cannot serve service '{}'",
                self.name(),
                target.service_id()
            )));
        };

        let translation = match dialect {
            FixedJsonDialect::ChatCompletion => self.chat_completion(job, target).await?,
            FixedJsonDialect::Deepl => self.deepl(job, target).await?,
            FixedJsonDialect::Google => self.google(job, target).await?,
        };

        if translation.is_empty() {
            return Err(ServiceError::UpstreamResponse("backend returned no translation".to_string()));
        }

        sink.push_text(translation).await
    }

    fn name(&self) -> &'static str {
        "fixed-json"
    }
}

#[derive(Debug, Serialize)]
struct DeeplRequest<'a> {
    text: [&'a str; 1],
    target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeeplResponse {
    translations: Vec<DeeplTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeeplTranslation {
    text: String,
}

#[derive(Debug, Serialize)]
struct GoogleRequest<'a> {
    q: &'a str,
    target: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    data: GoogleData,
}

#[derive(Debug, Deserialize)]
struct GoogleData {
    translations: Vec<GoogleTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTranslation {
    translated_text: String,
}
