pub mod backends;
pub mod events;

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, Once},
    time::Duration,
};

use config::Config;
use secrecy::SecretString;
use server::ServeConfig;
use tokio::{net::TcpListener, time::timeout};
use translate::{HistoryRecord, HistorySink, SecretSource};

pub use events::TranslateEvent;

static INIT: Once = Once::new();

fn init_crypto_provider() {
    INIT.call_once(|| {
        rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .expect("Failed to install default crypto provider");
    });
}

/// Test client for making HTTP requests to the test server
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Send a POST request to the given path with JSON body
    pub async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// Send a GET request to the given path
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    /// Start a request with an arbitrary method to the given path
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    /// Posts a translation request and collects every event of the response stream.
    pub async fn translate(&self, body: serde_json::Value) -> Vec<TranslateEvent> {
        let response = self.post("/translate", &body).await;

        assert_eq!(response.status(), 200, "translation request was rejected");
        events::collect(response).await
    }

    /// Access to the underlying client, for requests the helpers do not cover.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// The server's base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Secrets handed to the server instead of the process environment.
#[derive(Default)]
struct TestSecrets(HashMap<String, String>);

impl SecretSource for TestSecrets {
    fn get(&self, key: &str) -> Option<SecretString> {
        self.0.get(key).cloned().map(SecretString::from)
    }
}

/// Collects every finished translation of the server.
#[derive(Default)]
pub struct RecordedHistory(Mutex<Vec<HistoryRecord>>);

impl RecordedHistory {
    /// All records so far, sorted by service id.
    pub fn records(&self) -> Vec<HistoryRecord> {
        let mut records = self.0.lock().unwrap().clone();
        records.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        records
    }
}

impl HistorySink for RecordedHistory {
    fn record(&self, record: HistoryRecord) {
        self.0.lock().unwrap().push(record);
    }
}

/// Builder for a test server.
#[derive(Default)]
pub struct TestServerBuilder {
    secrets: HashMap<String, String>,
}

impl TestServerBuilder {
    /// Makes the secret available under the given key.
    pub fn secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }

    /// Start the server with the given TOML configuration
    pub async fn build(self, config_toml: &str) -> TestServer {
        let config: Config = toml::from_str(config_toml).unwrap();
        TestServer::start(config, TestSecrets(self.secrets)).await
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    pub history: Arc<RecordedHistory>,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Create a builder for a test server
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    async fn start(config: Config, secrets: TestSecrets) -> Self {
        init_crypto_provider();

        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let history = Arc::new(RecordedHistory::default());

        let serve_config = ServeConfig {
            listen_address: address,
            config,
            secrets: Some(Arc::new(secrets)),
            history: Some(history.clone()),
        };

        let (tx, mut rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            // Drop the listener so the server can bind to the address
            drop(listener);

            let _ = tx.send(server::serve(serve_config).await);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;

        if let Ok(Err(e)) = rx.try_recv() {
            eprintln!("Server failed to start: {e}");
            std::process::exit(1);
        }

        let client = TestClient::new(format!("http://{address}"));

        // Verify the server is actually running by making a simple request
        let mut retries = 10;

        while retries > 0 {
            let probe = client.inner().get(format!("{}/", client.base_url())).send();

            if let Ok(Ok(_)) = timeout(Duration::from_millis(100), probe).await {
                break;
            }

            retries -= 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestServer {
            client,
            address,
            history,
            _handle: handle,
        }
    }
}
