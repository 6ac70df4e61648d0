//! OpenAI-style chat completions, shared by every chat-speaking adapter.

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::{
    IntoUrl, RequestBuilder, Response,
    header::{ACCEPT, AUTHORIZATION},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{Http, content_type, is_event_stream, is_json, upstream_message};
use crate::{chunk::ChunkSink, error::DecodeError, error::ServiceError, messages::TranslationJob};

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
pub(super) struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl<'a> ChatRequest<'a> {
    pub(super) fn new(model: &'a str, job: &TranslationJob, stream: bool) -> Self {
        Self {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: job.prompt(),
            }],
            stream,
        }
    }
}

/// A complete, non-streamed chat completion.
#[derive(Debug, Deserialize)]
pub(super) struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    /// Content of the first choice, trimmed. `None` when there is nothing to show.
    pub(super) fn into_content(self) -> Option<String> {
        let content = self.choices.into_iter().next()?.message.content?;
        let content = content.trim();

        (!content.is_empty()).then(|| content.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Error { error: StreamError },
    Chunk { choices: Vec<StreamChoice> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamError {
    Detailed { message: String },
    Plain(String),
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// What one decoded server-sent event means for the translation.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum StreamEvent {
    /// New text to relay.
    Delta(String),
    /// A valid event without text, such as a role-only first chunk.
    Empty,
    /// The backend signalled the end of the stream.
    End,
    /// The backend reported an error in the stream.
    Failed(String),
}

pub(super) fn decode_event(event: &Event) -> Result<StreamEvent, DecodeError> {
    if event.event == "error" {
        let message = upstream_message(&event.data).unwrap_or_else(|| "backend reported an error".to_string());
        return Ok(StreamEvent::Failed(message));
    }

    let data = event.data.trim();

    if data == DONE_MARKER {
        return Ok(StreamEvent::End);
    }

    if data.is_empty() {
        return Ok(StreamEvent::Empty);
    }

    let payload = sonic_rs::from_str::<StreamPayload>(data).map_err(|_| {
        DecodeError(format!(
            "expected a chat completion chunk, got {} bytes of something else",
            data.len()
        ))
    })?;

    match payload {
        StreamPayload::Error {
            error: StreamError::Detailed { message } | StreamError::Plain(message),
        } => Ok(StreamEvent::Failed(message)),
        StreamPayload::Chunk { choices } => {
            let text: String = choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .collect();

            if text.is_empty() {
                Ok(StreamEvent::Empty)
            } else {
                Ok(StreamEvent::Delta(text))
            }
        }
    }
}

/// Builds an authenticated chat completion request.
pub(super) fn request(
    http: &Http,
    endpoint: impl IntoUrl,
    api_key: &SecretString,
    body: &ChatRequest<'_>,
) -> RequestBuilder {
    let accept = if body.stream {
        "text/event-stream"
    } else {
        "application/json"
    };

    http.client()
        .post(endpoint)
        .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
        .header(ACCEPT, accept)
        .json(body)
}

/// Relays a chat completion response into the sink.
///
/// Event streams are forwarded delta by delta. A backend that ignored the streaming flag and
/// answered with a plain JSON completion is relayed as one piece of text. Any other content
/// type is an upstream error.
pub(super) async fn relay(response: Response, http: &Http, sink: &mut ChunkSink) -> Result<(), ServiceError> {
    if is_json(&response) {
        log::debug!("Service '{}' answered without streaming", sink.service_id());

        let body = http.read_body(response).await?;

        let completion: ChatResponse = sonic_rs::from_str(&body)
            .map_err(|_| ServiceError::UpstreamResponse("body is not a chat completion".to_string()))?;

        let Some(content) = completion.into_content() else {
            return Err(ServiceError::UpstreamResponse("completion has no content".to_string()));
        };

        return sink.push_text(content).await;
    }

    if !is_event_stream(&response) {
        let content_type = content_type(&response).unwrap_or("no content type").to_string();

        return Err(ServiceError::UpstreamResponse(format!(
            "expected an event stream, got {content_type}"
        )));
    }

    relay_stream(response, http, sink).await
}

async fn relay_stream(response: Response, http: &Http, sink: &mut ChunkSink) -> Result<(), ServiceError> {
    let idle = http.idle();
    let mut events = Box::pin(response.bytes_stream().eventsource());
    let mut relayed_any = false;

    loop {
        let next = tokio::time::timeout(idle, events.next())
            .await
            .map_err(|_| ServiceError::Transport(format!("stream stalled for {}s", idle.as_secs_f32())))?;

        // The backend closed the connection without an end marker.
        let Some(event) = next else {
            if relayed_any {
                return Ok(());
            }

            return Err(ServiceError::UpstreamResponse(
                "stream closed before any translation arrived".to_string(),
            ));
        };

        let event = match event {
            Ok(event) => event,
            Err(EventStreamError::Transport(error)) => return Err(error.into()),
            Err(error) => {
                log::warn!("Skipping malformed event from service '{}': {error}", sink.service_id());
                continue;
            }
        };

        match decode_event(&event) {
            Ok(StreamEvent::Delta(text)) => {
                relayed_any = true;
                sink.push_text(text).await?;
            }
            Ok(StreamEvent::Empty) => {}
            Ok(StreamEvent::End) => return Ok(()),
            Ok(StreamEvent::Failed(message)) => return Err(ServiceError::UpstreamResponse(message)),
            Err(error) => log::warn!("Skipping event from service '{}': {error}", sink.service_id()),
        }
    }
}
