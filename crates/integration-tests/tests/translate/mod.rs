mod fixed_json;

use axum::http::StatusCode;
use integration_tests::{
    TestServer, TranslateEvent,
    backends::{ChatMock, MockBackend},
    events::{of, text_of},
};
use serde_json::json;

fn streaming_chat_service(id: &str, backend: &MockBackend) -> String {
    format!(
        r#"
        [translate.services.{id}]
        type = "streaming-chat"
        endpoint = "{}"
        model = "test-model"
        api_key_env = "{}_API_KEY"
        "#,
        backend.url("/v1/chat/completions"),
        id.to_uppercase(),
    )
}

fn allowed_origins(origins: &[&str]) -> String {
    let origins: Vec<String> = origins.iter().map(|origin| format!("{origin:?}")).collect();

    format!(
        r#"
        [translate.custom_endpoints]
        allowed_origins = [{}]
        "#,
        origins.join(", ")
    )
}

fn text_event(service_id: &str, text: &str) -> TranslateEvent {
    TranslateEvent::Text {
        service_id: service_id.to_string(),
        text: text.to_string(),
    }
}

fn done(service_id: &str) -> TranslateEvent {
    TranslateEvent::Done {
        service_id: service_id.to_string(),
    }
}

fn error(service_id: &str, message: &str) -> TranslateEvent {
    TranslateEvent::Error {
        service_id: service_id.to_string(),
        message: message.to_string(),
    }
}

/// Every service ends exactly once, and the end marker comes last.
fn assert_well_formed(events: &[TranslateEvent], services: &[&str]) {
    assert_eq!(events.last(), Some(&TranslateEvent::End));
    assert_eq!(events.iter().filter(|event| **event == TranslateEvent::End).count(), 1);

    for service in services {
        let service_events = of(events, service);
        let terminals = service_events.iter().filter(|event| event.is_terminal()).count();

        assert_eq!(terminals, 1, "service {service} must end exactly once: {service_events:?}");
        assert!(service_events.last().unwrap().is_terminal());
    }
}

#[tokio::test]
async fn builtin_and_custom_services_stream_side_by_side() {
    let openai = ChatMock::streaming(["你", "好"]).spawn().await;
    let custom = ChatMock::streaming(["你", "好"]).spawn().await;

    let config = format!(
        "{}{}",
        streaming_chat_service("openai", &openai),
        allowed_origins(&[&custom.origin()])
    );

    let server = TestServer::builder()
        .secret("OPENAI_API_KEY", "sk-openai")
        .build(&config)
        .await;

    let events = server
        .client
        .translate(json!({
            "text": "Hello",
            "sourceLang": "auto",
            "targetLang": "zh",
            "services": ["openai", "custom_1"],
            "customAPIs": [{
                "id": "custom_1",
                "name": "Mine",
                "endpoint": custom.url("/v1/chat/completions"),
                "apiKey": "sk-custom",
                "model": "my-model"
            }]
        }))
        .await;

    assert_well_formed(&events, &["openai", "custom_1"]);

    assert_eq!(
        of(&events, "openai"),
        [&text_event("openai", "你"), &text_event("openai", "好"), &done("openai")]
    );

    assert_eq!(
        of(&events, "custom_1"),
        [&text_event("custom_1", "你"), &text_event("custom_1", "好"), &done("custom_1")]
    );

    let openai_request = &openai.requests()[0];
    assert_eq!(openai_request.headers["authorization"], "Bearer sk-openai");
    assert_eq!(openai_request.body["model"], "test-model");
    assert_eq!(openai_request.body["stream"], true);

    let prompt = openai_request.body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("into zh"), "{prompt}");
    assert!(!prompt.contains("from auto"), "{prompt}");
    assert!(prompt.ends_with("Hello"), "{prompt}");

    let custom_request = &custom.requests()[0];
    assert_eq!(custom_request.headers["authorization"], "Bearer sk-custom");
    assert_eq!(custom_request.body["model"], "my-model");
    assert_eq!(custom_request.body["stream"], true);

    let history: Vec<_> = server
        .history
        .records()
        .into_iter()
        .map(|record| (record.service_id, record.full_text))
        .collect();

    assert_eq!(
        history,
        [
            ("custom_1".to_string(), "你好".to_string()),
            ("openai".to_string(), "你好".to_string())
        ]
    );
}

#[tokio::test]
async fn custom_endpoint_answering_with_json() {
    let custom = ChatMock::non_streaming("  Hallo Welt \n").spawn().await;

    let server = TestServer::builder()
        .build(&allowed_origins(&[&custom.origin()]))
        .await;

    let events = server
        .client
        .translate(json!({
            "text": "Hello world",
            "targetLang": "de",
            "services": ["custom_local"],
            "customAPIs": [{
                "id": "custom_local",
                "name": "Local",
                "endpoint": custom.url("/v1/chat/completions"),
                "apiKey": "sk-local",
                "model": "qwen2.5"
            }]
        }))
        .await;

    assert_eq!(
        events,
        [
            text_event("custom_local", "Hallo Welt"),
            done("custom_local"),
            TranslateEvent::End
        ]
    );

    assert_eq!(server.history.records()[0].full_text, "Hallo Welt");
}

#[tokio::test]
async fn unauthorized_custom_endpoint_is_never_called() {
    let custom = ChatMock::streaming(["secret"]).spawn().await;

    let server = TestServer::builder()
        .build(&allowed_origins(&["https://allowed.example"]))
        .await;

    let events = server
        .client
        .translate(json!({
            "text": "Hello",
            "targetLang": "zh",
            "services": ["custom_1"],
            "customAPIs": [{
                "id": "custom_1",
                "endpoint": custom.url("/v1/chat/completions"),
                "apiKey": "sk-custom",
                "model": "my-model"
            }]
        }))
        .await;

    assert_eq!(
        events,
        [
            error(
                "custom_1",
                "Endpoint for service 'custom_1' is not authorized: origin is not in the allowed list"
            ),
            TranslateEvent::End
        ]
    );

    assert_eq!(custom.request_count(), 0);
    assert!(server.history.records().is_empty());
}

#[tokio::test]
async fn custom_endpoints_are_refused_by_default() {
    let custom = ChatMock::streaming(["secret"]).spawn().await;
    let server = TestServer::builder().build("").await;

    let events = server
        .client
        .translate(json!({
            "text": "Hello",
            "targetLang": "zh",
            "services": ["custom_1"],
            "customAPIs": [{
                "id": "custom_1",
                "endpoint": custom.url("/v1/chat/completions"),
                "apiKey": "sk-custom",
                "model": "my-model"
            }]
        }))
        .await;

    assert_well_formed(&events, &["custom_1"]);
    assert!(matches!(&events[0], TranslateEvent::Error { .. }));
    assert_eq!(custom.request_count(), 0);
}

#[tokio::test]
async fn malformed_line_is_skipped() {
    let openai = ChatMock::streaming(["Bon", "jour"]).with_malformed_line().spawn().await;

    let server = TestServer::builder()
        .secret("OPENAI_API_KEY", "sk-openai")
        .build(&streaming_chat_service("openai", &openai))
        .await;

    let events = server
        .client
        .translate(json!({ "text": "Hello", "targetLang": "fr", "services": ["openai"] }))
        .await;

    assert_eq!(
        events,
        [
            text_event("openai", "Bon"),
            text_event("openai", "jour"),
            done("openai"),
            TranslateEvent::End
        ]
    );
}

#[tokio::test]
async fn one_failing_service_does_not_affect_the_others() {
    let openai = ChatMock::streaming(["Hallo"]).spawn().await;
    let tongyi = ChatMock::streaming(["ignored"])
        .with_status(StatusCode::UNAUTHORIZED, "Incorrect API key provided")
        .spawn()
        .await;

    let config = format!(
        "{}{}",
        streaming_chat_service("openai", &openai),
        streaming_chat_service("tongyi", &tongyi)
    );

    let server = TestServer::builder()
        .secret("OPENAI_API_KEY", "sk-openai")
        .secret("TONGYI_API_KEY", "sk-tongyi")
        .build(&config)
        .await;

    let events = server
        .client
        .translate(json!({ "text": "Hello", "targetLang": "de", "services": ["tongyi", "openai"] }))
        .await;

    assert_well_formed(&events, &["openai", "tongyi"]);

    assert_eq!(text_of(&events, "openai"), "Hallo");
    assert_eq!(of(&events, "openai").last(), Some(&&done("openai")));

    assert_eq!(
        of(&events, "tongyi"),
        [&error("tongyi", "Backend returned 401: Incorrect API key provided")]
    );

    let history = server.history.records();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].service_id, "openai");
}

#[tokio::test]
async fn error_reported_inside_the_stream() {
    let openai = ChatMock::streaming(["Ha", "llo"])
        .with_stream_error("The server had an error while processing your request")
        .spawn()
        .await;

    let server = TestServer::builder()
        .secret("OPENAI_API_KEY", "sk-openai")
        .build(&streaming_chat_service("openai", &openai))
        .await;

    let events = server
        .client
        .translate(json!({ "text": "Hello", "targetLang": "de", "services": ["openai"] }))
        .await;

    assert_eq!(
        events,
        [
            text_event("openai", "Ha"),
            error(
                "openai",
                "Unexpected response from backend: The server had an error while processing your request"
            ),
            TranslateEvent::End
        ]
    );

    assert!(server.history.records().is_empty());
}

#[tokio::test]
async fn missing_secret_fails_only_that_service() {
    let openai = ChatMock::streaming(["Hola"]).spawn().await;
    let tongyi = ChatMock::streaming(["never"]).spawn().await;

    let config = format!(
        "{}{}",
        streaming_chat_service("openai", &openai),
        streaming_chat_service("tongyi", &tongyi)
    );

    let server = TestServer::builder()
        .secret("OPENAI_API_KEY", "sk-openai")
        .build(&config)
        .await;

    let events = server
        .client
        .translate(json!({ "text": "Hello", "targetLang": "es", "services": ["openai", "tongyi"] }))
        .await;

    assert_well_formed(&events, &["openai", "tongyi"]);
    assert_eq!(text_of(&events, "openai"), "Hola");

    assert_eq!(
        of(&events, "tongyi"),
        [&error(
            "tongyi",
            "No API key configured for service 'tongyi' (TONGYI_API_KEY is not set)"
        )]
    );

    assert_eq!(tongyi.request_count(), 0);
}

#[tokio::test]
async fn unknown_service() {
    let server = TestServer::builder().build("").await;

    let events = server
        .client
        .translate(json!({ "text": "Hello", "targetLang": "es", "services": ["babelfish"] }))
        .await;

    assert_eq!(
        events,
        [
            error("babelfish", "Unknown translation service 'babelfish'"),
            TranslateEvent::End
        ]
    );
}

#[tokio::test]
async fn duplicate_services_run_once() {
    let openai = ChatMock::streaming(["Ciao"]).spawn().await;

    let server = TestServer::builder()
        .secret("OPENAI_API_KEY", "sk-openai")
        .build(&streaming_chat_service("openai", &openai))
        .await;

    let events = server
        .client
        .translate(json!({ "text": "Hello", "targetLang": "it", "services": ["openai", "openai"] }))
        .await;

    assert_eq!(
        events,
        [text_event("openai", "Ciao"), done("openai"), TranslateEvent::End]
    );

    assert_eq!(openai.request_count(), 1);
}

#[tokio::test]
async fn multiline_translation_keeps_its_line_breaks() {
    let openai = ChatMock::streaming(["first line\r\nsecond", " line"]).spawn().await;

    let server = TestServer::builder()
        .secret("OPENAI_API_KEY", "sk-openai")
        .build(&streaming_chat_service("openai", &openai))
        .await;

    let events = server
        .client
        .translate(json!({ "text": "Hello\nWorld", "targetLang": "en", "services": ["openai"] }))
        .await;

    assert_eq!(text_of(&events, "openai"), "first line\nsecond line");
}

#[tokio::test]
async fn missing_parameters_are_rejected() {
    let server = TestServer::builder().build("").await;

    let response = server
        .client
        .post("/translate", &json!({ "text": "", "targetLang": "zh", "services": ["openai"] }))
        .await;

    assert_eq!(response.status(), 400);

    let body = response.text().await.unwrap();
    insta::assert_snapshot!(body, @r#"{"error":{"message":"Invalid request: text must not be empty","type":"invalid_request_error","code":400}}"#);

    let response = server
        .client
        .post("/translate", &json!({ "text": "Hello", "targetLang": "zh", "services": [] }))
        .await;

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let server = TestServer::builder().build("").await;

    let response = server
        .client
        .inner()
        .post(format!("{}/translate", server.client.base_url()))
        .header("content-type", "application/json")
        .body("{\"text\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}
