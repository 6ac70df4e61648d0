//! Decoding of the translation event stream, as a browser client would see it.

use eventsource_stream::Eventsource;
use futures::StreamExt;

/// One event of a translation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateEvent {
    Text { service_id: String, text: String },
    Done { service_id: String },
    Error { service_id: String, message: String },
    End,
}

impl TranslateEvent {
    /// The service the event belongs to. `None` for the stream-wide end marker.
    pub fn service_id(&self) -> Option<&str> {
        match self {
            Self::Text { service_id, .. } | Self::Done { service_id } | Self::Error { service_id, .. } => {
                Some(service_id)
            }
            Self::End => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Reads the whole response stream.
pub async fn collect(response: reqwest::Response) -> Vec<TranslateEvent> {
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");

    let mut stream = response.bytes_stream().eventsource();
    let mut events = Vec::new();

    while let Some(event) = stream.next().await {
        let event = event.unwrap();
        let (service_id, payload) = event.data.split_once('\n').unwrap_or((event.data.as_str(), ""));

        let decoded = match event.event.as_str() {
            "end" => TranslateEvent::End,
            "done" => {
                assert_eq!(payload, "[DONE]");

                TranslateEvent::Done {
                    service_id: service_id.to_string(),
                }
            }
            "error" => {
                let payload: serde_json::Value = serde_json::from_str(payload).unwrap();

                TranslateEvent::Error {
                    service_id: service_id.to_string(),
                    message: payload["error"].as_str().unwrap().to_string(),
                }
            }
            _ => TranslateEvent::Text {
                service_id: service_id.to_string(),
                text: payload.to_string(),
            },
        };

        events.push(decoded);
    }

    events
}

/// The events of one service, in the order they arrived.
pub fn of<'a>(events: &'a [TranslateEvent], service_id: &str) -> Vec<&'a TranslateEvent> {
    events
        .iter()
        .filter(|event| event.service_id() == Some(service_id))
        .collect()
}

/// All text of one service, concatenated.
pub fn text_of(events: &[TranslateEvent], service_id: &str) -> String {
    of(events, service_id)
        .into_iter()
        .filter_map(|event| match event {
            TranslateEvent::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
