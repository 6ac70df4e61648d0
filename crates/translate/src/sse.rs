use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};

use crate::{
    chunk::{ChunkKind, NormalizedChunk},
    session::ChunkStream,
};

const DONE_MARKER: &str = "[DONE]";
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Encodes one chunk as one event. The first data line is always the service id.
pub(crate) fn encode(chunk: NormalizedChunk) -> Event {
    let NormalizedChunk {
        service_id,
        kind,
        payload,
    } = chunk;

    match kind {
        ChunkKind::Text => Event::default().data(format!("{service_id}\n{}", normalize_line_breaks(&payload))),
        ChunkKind::Done => Event::default()
            .event("done")
            .data(format!("{service_id}\n{DONE_MARKER}")),
        ChunkKind::Error => {
            let error = serde_json::json!({ "error": payload });

            Event::default().event("error").data(format!("{service_id}\n{error}"))
        }
    }
}

/// The whole response body: every chunk as it arrives, then the `end` marker.
pub(crate) fn into_sse(chunks: ChunkStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let end = futures::stream::once(async { Event::default().event("end").data(DONE_MARKER) });
    let events = chunks.map(encode).chain(end).map(Ok::<_, Infallible>);

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

/// Event data cannot carry carriage returns.
fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;

    async fn body(chunks: Vec<NormalizedChunk>) -> String {
        let stream: ChunkStream = Box::pin(futures::stream::iter(chunks));
        let response = into_sse(stream).into_response();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn wire_format() {
        let body = body(vec![
            NormalizedChunk::text("openai", "你"),
            NormalizedChunk::text("custom_1", "你好"),
            NormalizedChunk::text("openai", "好"),
            NormalizedChunk::done("openai"),
            NormalizedChunk::error("custom_1", "Backend returned 401: \"bad key\""),
        ])
        .await;

        insta::assert_snapshot!(body, @r#"
        data: openai
        data: 你

        data: custom_1
        data: 你好

        data: openai
        data: 好

        event: done
        data: openai
        data: [DONE]

        event: error
        data: custom_1
        data: {"error":"Backend returned 401: \"bad key\""}

        event: end
        data: [DONE]
        "#);
    }

    #[tokio::test]
    async fn multiline_text() {
        let body = body(vec![NormalizedChunk::text("deepl", "line one\r\nline two\rline three")]).await;

        insta::assert_snapshot!(body, @r"
        data: deepl
        data: line one
        data: line two
        data: line three

        event: end
        data: [DONE]
        ");
    }

    #[tokio::test]
    async fn empty_session_still_ends() {
        let body = body(Vec::new()).await;

        insta::assert_snapshot!(body, @r"
        event: end
        data: [DONE]
        ");
    }
}
