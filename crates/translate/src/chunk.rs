use tokio::sync::mpsc;

use crate::error::ServiceError;

/// What a [`NormalizedChunk`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkKind {
    /// A piece of translated text.
    Text,
    /// The service finished successfully. Terminal.
    Done,
    /// The service failed; the payload is a human-readable cause. Terminal.
    Error,
}

/// One unit of output attributable to one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NormalizedChunk {
    pub(crate) service_id: String,
    pub(crate) kind: ChunkKind,
    pub(crate) payload: String,
}

impl NormalizedChunk {
    pub(crate) fn text(service_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            kind: ChunkKind::Text,
            payload: payload.into(),
        }
    }

    pub(crate) fn done(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            kind: ChunkKind::Done,
            payload: String::new(),
        }
    }

    pub(crate) fn error(service_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            kind: ChunkKind::Error,
            payload: message.into(),
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self.kind, ChunkKind::Done | ChunkKind::Error)
    }
}

/// The write end of the session output, bound to a single service.
///
/// Adapters push text through it; [`ChunkSink::finish`] consumes the sink, so after the
/// terminal chunk nothing more can be written for the service.
pub(crate) struct ChunkSink {
    service_id: String,
    sender: mpsc::Sender<NormalizedChunk>,
    full_text: String,
}

impl ChunkSink {
    pub(crate) fn new(service_id: impl Into<String>, sender: mpsc::Sender<NormalizedChunk>) -> Self {
        Self {
            service_id: service_id.into(),
            sender,
            full_text: String::new(),
        }
    }

    pub(crate) fn service_id(&self) -> &str {
        &self.service_id
    }

    /// A handle keeping the session output open after the sink is finished.
    pub(crate) fn hold_open(&self) -> mpsc::Sender<NormalizedChunk> {
        self.sender.clone()
    }

    /// Relays one piece of text to the client. Empty pieces are dropped.
    pub(crate) async fn push_text(&mut self, text: impl Into<String>) -> Result<(), ServiceError> {
        let text = text.into();

        if text.is_empty() {
            return Ok(());
        }

        self.full_text.push_str(&text);

        self.sender
            .send(NormalizedChunk::text(&self.service_id, text))
            .await
            .map_err(|_| ServiceError::Cancelled)
    }

    /// Writes the terminal chunk for the adapter's outcome.
    ///
    /// Returns the concatenated text when the service finished with `Done` and the client
    /// received it.
    pub(crate) async fn finish(self, outcome: Result<(), ServiceError>) -> Option<String> {
        let chunk = match outcome {
            Ok(()) => NormalizedChunk::done(&self.service_id),
            Err(ServiceError::Cancelled) => return None,
            Err(error) => {
                log::warn!(
                    "Service '{}' failed with {}: {error}",
                    self.service_id,
                    error.error_type()
                );

                NormalizedChunk::error(&self.service_id, error.to_string())
            }
        };

        let done = chunk.kind == ChunkKind::Done;

        if self.sender.send(chunk).await.is_err() {
            log::debug!("Client went away before service '{}' finished", self.service_id);
            return None;
        }

        done.then_some(self.full_text)
    }
}
