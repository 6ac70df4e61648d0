use indoc::formatdoc;
use integration_tests::{TestServer, TranslateEvent, backends::JsonMock};
use serde_json::json;

#[tokio::test]
async fn deepl_and_google_answer_in_one_chunk() {
    let deepl = JsonMock::deepl("Bonjour").spawn().await;
    let google = JsonMock::google("Bonjour!").spawn().await;

    let config = formatdoc! {r#"
        [translate.services.deepl]
        type = "fixed-json"
        dialect = "deepl"
        endpoint = "{}"
        api_key_env = "DEEPL_API_KEY"

        [translate.services.google]
        type = "fixed-json"
        dialect = "google"
        endpoint = "{}"
        api_key_env = "GOOGLE_TRANSLATE_API_KEY"
    "#, deepl.url("/translate"), google.url("/translate")};

    let server = TestServer::builder()
        .secret("DEEPL_API_KEY", "deepl-key")
        .secret("GOOGLE_TRANSLATE_API_KEY", "google-key")
        .build(&config)
        .await;

    let events = server
        .client
        .translate(json!({ "text": "Hello", "targetLang": "fr", "services": ["deepl", "google"] }))
        .await;

    for (service_id, text) in [("deepl", "Bonjour"), ("google", "Bonjour!")] {
        let service_events = integration_tests::events::of(&events, service_id);

        assert_eq!(
            service_events,
            [
                &TranslateEvent::Text {
                    service_id: service_id.to_string(),
                    text: text.to_string()
                },
                &TranslateEvent::Done {
                    service_id: service_id.to_string()
                }
            ]
        );
    }

    assert_eq!(events.last(), Some(&TranslateEvent::End));

    let deepl_request = &deepl.requests()[0];
    assert_eq!(deepl_request.headers["authorization"], "DeepL-Auth-Key deepl-key");

    assert_eq!(deepl_request.body, json!({ "text": ["Hello"], "target_lang": "FR" }));

    let google_request = &google.requests()[0];
    assert_eq!(google_request.headers["x-goog-api-key"], "google-key");

    assert_eq!(google_request.body, json!({ "q": "Hello", "target": "fr", "format": "text" }));

    assert_eq!(server.history.records().len(), 2);
}

#[tokio::test]
async fn unexpected_response_shape() {
    let deepl = JsonMock::new(json!({ "message": "quota exceeded" })).spawn().await;

    let config = formatdoc! {r#"
        [translate.services.deepl]
        type = "fixed-json"
        dialect = "deepl"
        endpoint = "{}"
        api_key_env = "DEEPL_API_KEY"
    "#, deepl.url("/translate")};

    let server = TestServer::builder()
        .secret("DEEPL_API_KEY", "deepl-key")
        .build(&config)
        .await;

    let events = server
        .client
        .translate(json!({ "text": "Hello", "targetLang": "fr", "services": ["deepl"] }))
        .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], TranslateEvent::Error { service_id, .. } if service_id == "deepl"));
    assert_eq!(events[1], TranslateEvent::End);
    assert!(server.history.records().is_empty());
}
