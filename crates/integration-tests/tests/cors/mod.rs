use indoc::{formatdoc, indoc};
use integration_tests::TestServer;
use reqwest::Method;

const EXTENSION_ORIGIN: &str = "chrome-extension://abcdefghijklmnop";

async fn preflight(server: &TestServer, origin: &str) -> reqwest::Response {
    server
        .client
        .request(Method::OPTIONS, "/translate")
        .header("Origin", origin)
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "content-type")
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn any_client_may_translate_without_cors_config() {
    let server = TestServer::builder().build("").await;

    let response = preflight(&server, EXTENSION_ORIGIN).await;
    assert_eq!(response.status(), 200);

    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(headers.contains_key("access-control-allow-methods"));
}

#[tokio::test]
async fn extension_origin_can_be_listed() {
    let config = cors_config(EXTENSION_ORIGIN);
    let server = TestServer::builder().build(&config).await;

    let response = preflight(&server, EXTENSION_ORIGIN).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], EXTENSION_ORIGIN);

    let response = preflight(&server, "https://unknown.example").await;
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

fn cors_config(origin: &str) -> String {
    formatdoc! {r#"
        [server.cors]
        allow_origins = ["{origin}", "https://translate.example"]
        allow_methods = ["POST"]
        allow_headers = ["content-type"]
    "#}
}

#[tokio::test]
async fn preflight_is_always_allowed() {
    let server = TestServer::builder().build(&cors_config(EXTENSION_ORIGIN)).await;

    let response = preflight(&server, "https://translate.example").await;
    assert_eq!(response.status(), 200);

    let allowed_methods = response.headers()["access-control-allow-methods"].to_str().unwrap();
    assert!(allowed_methods.contains("POST"));
    assert!(allowed_methods.contains("OPTIONS"));
    assert!(!allowed_methods.contains("GET"));
}

#[tokio::test]
async fn event_stream_carries_cors_headers() {
    let server = TestServer::builder().build(&cors_config(EXTENSION_ORIGIN)).await;

    let response = server
        .client
        .request(Method::POST, "/translate")
        .header("Origin", "https://translate.example")
        .json(&serde_json::json!({ "text": "Hello", "targetLang": "zh", "services": ["deepl"] }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "https://translate.example");
    assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));
}

#[tokio::test]
async fn health_checks_from_other_origins_get_no_cors_headers() {
    let config = indoc! {r#"
        [server.cors]
        allow_origins = ["https://translate.example"]
        max_age = "10m"
    "#};

    let server = TestServer::builder().build(config).await;

    let response = server
        .client
        .request(Method::GET, "/health")
        .header("Origin", "https://monitor.example")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().get("access-control-allow-origin").is_none());

    let response = preflight(&server, "https://translate.example").await;
    assert_eq!(response.headers()["access-control-max-age"], "600");
}
