//! Mock translation backends.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// A request a mock backend received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub headers: HeaderMap,
    pub body: Value,
}

/// A running mock backend.
pub struct MockBackend {
    address: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    /// Full URL of a path on the backend.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }

    /// Scheme, host and port of the backend, as used in allow-lists.
    pub fn origin(&self) -> String {
        format!("http://{}", self.address)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[derive(Clone)]
enum Failure {
    Status(StatusCode, String),
    InStream(String),
}

/// An OpenAI-compatible chat completions backend, mounted at `/v1/chat/completions`.
#[derive(Clone)]
pub struct ChatMock {
    deltas: Vec<String>,
    malformed_line: bool,
    failure: Option<Failure>,
    streaming: bool,
}

impl ChatMock {
    /// Streams the given deltas, one event each, then `[DONE]`.
    pub fn streaming<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deltas: deltas.into_iter().map(Into::into).collect(),
            malformed_line: false,
            failure: None,
            streaming: true,
        }
    }

    /// Answers with a complete JSON completion regardless of the streaming flag.
    pub fn non_streaming(content: impl Into<String>) -> Self {
        Self {
            streaming: false,
            ..Self::streaming([content])
        }
    }

    /// Sends a line that is not JSON after the first delta.
    pub fn with_malformed_line(mut self) -> Self {
        self.malformed_line = true;
        self
    }

    /// Reports an error object in the stream after the first delta.
    pub fn with_stream_error(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(Failure::InStream(message.into()));
        self
    }

    /// Rejects every request with the given status.
    pub fn with_status(mut self, status: StatusCode, message: impl Into<String>) -> Self {
        self.failure = Some(Failure::Status(status, message.into()));
        self
    }

    pub async fn spawn(self) -> MockBackend {
        let requests = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .with_state((Arc::new(self), requests.clone()));

        spawn(app, requests).await
    }

    fn event_stream(&self) -> String {
        let mut body = String::new();

        for (index, delta) in self.deltas.iter().enumerate() {
            let chunk = json!({
                "id": "chatcmpl-mock",
                "object": "chat.completion.chunk",
                "choices": [{ "index": 0, "delta": { "content": delta }, "finish_reason": null }]
            });

            body.push_str(&format!("data: {chunk}\n\n"));

            if index == 0 && self.malformed_line {
                body.push_str("data: {\"choices\":[{\"delta\":\n\n");
            }

            if index == 0
                && let Some(Failure::InStream(message)) = &self.failure
            {
                let error = json!({ "error": { "message": message, "type": "server_error" } });
                body.push_str(&format!("data: {error}\n\n"));
            }
        }

        body.push_str("data: [DONE]\n\n");
        body
    }
}

type ChatState = (Arc<ChatMock>, Arc<Mutex<Vec<RecordedRequest>>>);

async fn chat_completions(
    State((mock, requests)): State<ChatState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    requests.lock().unwrap().push(RecordedRequest { headers, body });

    if let Some(Failure::Status(status, message)) = &mock.failure {
        let error = json!({ "error": { "message": message, "type": "invalid_request_error" } });
        return (*status, Json(error)).into_response();
    }

    if !mock.streaming {
        let content: String = mock.deltas.concat();

        return Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }]
        }))
        .into_response();
    }

    ([(CONTENT_TYPE, "text/event-stream")], mock.event_stream()).into_response()
}

/// A backend answering every POST with the same JSON document, mounted at `/translate`.
pub struct JsonMock {
    body: Value,
}

impl JsonMock {
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    /// A DeepL v2 answer.
    pub fn deepl(text: &str) -> Self {
        Self::new(json!({ "translations": [{ "detected_source_language": "EN", "text": text }] }))
    }

    /// A Google Cloud Translation v2 answer.
    pub fn google(text: &str) -> Self {
        Self::new(json!({ "data": { "translations": [{ "translatedText": text }] } }))
    }

    pub async fn spawn(self) -> MockBackend {
        let requests = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new()
            .route("/translate", post(fixed_json))
            .with_state((Arc::new(self.body), requests.clone()));

        spawn(app, requests).await
    }
}

async fn fixed_json(
    State((response, requests)): State<(Arc<Value>, Arc<Mutex<Vec<RecordedRequest>>>)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    requests.lock().unwrap().push(RecordedRequest { headers, body });
    Json(response.as_ref().clone())
}

async fn spawn(app: Router, requests: Arc<Mutex<Vec<RecordedRequest>>>) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend { address, requests }
}
