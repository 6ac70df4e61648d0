mod chat;
mod custom;
mod fixed_json;
mod streaming_chat;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use config::TimeoutConfig;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, header::CONTENT_TYPE, redirect};
use serde::Deserialize;

use crate::{chunk::ChunkSink, error::ServiceError, messages::TranslationJob, target::ServiceTarget};

/// Upstream error bodies are cut to this many characters before they reach the client.
const MAX_UPSTREAM_MESSAGE_CHARS: usize = 300;

/// Which adapter serves a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AdapterKind {
    FixedJson,
    StreamingChat,
    CustomStreamingChat,
}

/// Turns one translation job into text chunks for one backend protocol.
///
/// The adapter only pushes `Text`; the returned result decides the terminal chunk.
#[async_trait]
pub(crate) trait BackendAdapter: Send + Sync {
    async fn run(&self, job: &TranslationJob, target: &ServiceTarget, sink: &mut ChunkSink)
    -> Result<(), ServiceError>;

    fn name(&self) -> &'static str;
}

/// One adapter per [`AdapterKind`], sharing a connection pool.
#[derive(Clone)]
pub(crate) struct Adapters {
    fixed_json: Arc<dyn BackendAdapter>,
    streaming_chat: Arc<dyn BackendAdapter>,
    custom_streaming_chat: Arc<dyn BackendAdapter>,
}

impl Adapters {
    pub(crate) fn new(timeouts: &TimeoutConfig) -> anyhow::Result<Self> {
        let http = Http::new(timeouts)?;

        Ok(Self {
            fixed_json: Arc::new(fixed_json::FixedJsonAdapter::new(http.clone())),
            streaming_chat: Arc::new(streaming_chat::StreamingChatAdapter::new(http.clone())),
            custom_streaming_chat: Arc::new(custom::CustomStreamingChatAdapter::new(http)),
        })
    }

    /// Serves every kind with the same adapter.
    #[cfg(test)]
    pub(crate) fn uniform(adapter: Arc<dyn BackendAdapter>) -> Self {
        Self {
            fixed_json: adapter.clone(),
            streaming_chat: adapter.clone(),
            custom_streaming_chat: adapter,
        }
    }

    pub(crate) fn get(&self, kind: AdapterKind) -> &Arc<dyn BackendAdapter> {
        match kind {
            AdapterKind::FixedJson => &self.fixed_json,
            AdapterKind::StreamingChat => &self.streaming_chat,
            AdapterKind::CustomStreamingChat => &self.custom_streaming_chat,
        }
    }
}

/// The HTTP client and the timeouts every adapter applies to it.
#[derive(Clone)]
pub(crate) struct Http {
    client: Client,
    first_byte: Duration,
    idle: Duration,
}

impl Http {
    fn new(timeouts: &TimeoutConfig) -> anyhow::Result<Self> {
        // Redirect targets never went through the endpoint policy. A 3xx fails the service.
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client for translation backends: {e}"))?;

        Ok(Self {
            client,
            first_byte: timeouts.first_byte,
            idle: timeouts.idle,
        })
    }

    fn client(&self) -> &Client {
        &self.client
    }

    /// Sends the request and waits for response headers, then rejects non-success statuses.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = tokio::time::timeout(self.first_byte, request.send())
            .await
            .map_err(|_| {
                ServiceError::Transport(format!("no response within {}s", self.first_byte.as_secs_f32()))
            })??;

        check_status(response, self.idle).await
    }

    /// Reads the whole body, failing when no data arrives for longer than the idle timeout.
    async fn read_body(&self, response: Response) -> Result<String, ServiceError> {
        read_body(response, self.idle).await
    }

    fn idle(&self) -> Duration {
        self.idle
    }
}

async fn read_body(response: Response, idle: Duration) -> Result<String, ServiceError> {
    let mut chunks = response.bytes_stream();
    let mut body = Vec::new();

    loop {
        let next = tokio::time::timeout(idle, chunks.next())
            .await
            .map_err(|_| ServiceError::Transport(format!("response body stalled for {}s", idle.as_secs_f32())))?;

        match next {
            Some(chunk) => body.extend_from_slice(&chunk?),
            None => break,
        }
    }

    String::from_utf8(body).map_err(|_| ServiceError::UpstreamResponse("body is not valid UTF-8".to_string()))
}

async fn check_status(response: Response, idle: Duration) -> Result<Response, ServiceError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = read_body(response, idle).await.unwrap_or_default();
    let message = upstream_message(&body).unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

    log::debug!("Backend answered with status {status}");

    Err(ServiceError::UpstreamStatus {
        status: status.as_u16(),
        message,
    })
}

fn content_type(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::trim_start)
}

/// Whether the response body is a plain JSON document rather than an event stream.
fn is_json(response: &Response) -> bool {
    content_type(response).is_some_and(|value| value.starts_with("application/json"))
}

fn is_event_stream(response: &Response) -> bool {
    content_type(response).is_some_and(|value| value.starts_with("text/event-stream"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UpstreamErrorBody {
    Nested { error: UpstreamErrorDetails },
    Flat { error: String },
    Message { message: String },
}

#[derive(Deserialize)]
struct UpstreamErrorDetails {
    message: String,
}

/// Extracts a readable cause from an upstream error body.
fn upstream_message(body: &str) -> Option<String> {
    let message = match sonic_rs::from_str::<UpstreamErrorBody>(body) {
        Ok(UpstreamErrorBody::Nested { error }) => error.message,
        Ok(UpstreamErrorBody::Flat { error }) => error,
        Ok(UpstreamErrorBody::Message { message }) => message,
        Err(_) => body.trim().to_string(),
    };

    if message.is_empty() {
        return None;
    }

    Some(truncate(&message))
}

fn truncate(message: &str) -> String {
    let mut chars = message.chars();
    let mut truncated: String = chars.by_ref().take(MAX_UPSTREAM_MESSAGE_CHARS).collect();

    if chars.next().is_some() {
        truncated.push_str("...");
    }

    truncated
}
