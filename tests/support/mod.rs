//! Shared helpers for integration tests: a scripted HTTP backend and SDK wiring

#![allow(dead_code)]

use edgeinfer::device::{HardwareCapabilities, MemoryIdentityStore};
use edgeinfer::progress::CollectingHandler;
use edgeinfer::runtime::{MockEmbeddingRuntime, MockRuntime};
use edgeinfer::telemetry::TelemetryTransport;
use edgeinfer::{EdgeSdk, SdkConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

type Routes = HashMap<(String, String), (u16, String)>;

/// Minimal HTTP/1.1 server answering canned JSON per method and path
///
/// Unknown routes get a 404. Every request is recorded.
pub struct StubBackend {
    url: String,
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl StubBackend {
    /// Starts with the auth, health, registration and telemetry routes answered
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let routes: Arc<Mutex<Routes>> = Arc::default();
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::default();

        let task = {
            let routes = routes.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = routes.clone();
                    let requests = requests.clone();
                    tokio::spawn(async move {
                        let _ = serve(stream, routes, requests).await;
                    });
                }
            })
        };

        let backend = Self {
            url,
            routes,
            requests,
            task,
        };
        backend.route("POST", "/api/auth/sdk", 200, serde_json::json!({ "token": "tok_test" }));
        backend.route("GET", "/api/health", 200, serde_json::json!({ "status": "ok" }));
        backend.route("POST", "/api/devices/register", 200, serde_json::json!({ "ok": true }));
        backend.route("POST", "/api/devices/telemetry", 200, serde_json::json!({ "ok": true }));
        backend.route("POST", "/api/telemetry", 200, serde_json::json!({ "ok": true }));
        backend
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn route(&self, method: &str, path: &str, status: u16, body: serde_json::Value) {
        self.routes
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), (status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Polls until a request to `path` shows up or `timeout` passes
    pub async fn wait_for(&self, path: &str, timeout: Duration) -> Option<RecordedRequest> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(request) = self.requests_to(path).pop() {
                return Some(request);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for StubBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: Arc<Mutex<Routes>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buffer, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    let body_end = buffer.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buffer[header_end..body_end]).to_string();

    let (status, response_body) = routes
        .lock()
        .unwrap()
        .get(&(method.clone(), path.clone()))
        .cloned()
        .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));

    requests.lock().unwrap().push(RecordedRequest {
        method,
        path,
        headers,
        body,
    });

    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        response_body.len(),
        response_body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Config pointing at `api_url` with environment-provided fallback cleared
pub fn test_config(api_url: &str) -> SdkConfig {
    let mut config = SdkConfig::default()
        .with_api_key("ei_test_key")
        .with_api_url(api_url)
        .with_default_model("quantum-0.5b");
    config.fallback = None;
    config.telemetry_enabled = true;
    config
}

pub struct Harness {
    pub sdk: EdgeSdk,
    pub runtime: Arc<MockRuntime>,
    pub embeddings: Arc<MockEmbeddingRuntime>,
    pub handler: Arc<CollectingHandler>,
}

pub struct HarnessBuilder {
    config: SdkConfig,
    runtime: Arc<MockRuntime>,
    embeddings: Arc<MockEmbeddingRuntime>,
    memory_mb: u64,
    transport: Option<Arc<dyn TelemetryTransport>>,
    flush_interval: Option<Duration>,
}

impl HarnessBuilder {
    pub fn new(config: SdkConfig) -> Self {
        Self {
            config,
            runtime: Arc::new(MockRuntime::default()),
            embeddings: Arc::new(MockEmbeddingRuntime::default()),
            memory_mb: 8192,
            transport: None,
            flush_interval: None,
        }
    }

    pub fn runtime(mut self, runtime: MockRuntime) -> Self {
        self.runtime = Arc::new(runtime);
        self
    }

    pub fn memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn TelemetryTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn build(self) -> Harness {
        let handler = Arc::new(CollectingHandler::new());
        let mut builder = EdgeSdk::builder(self.config)
            .runtime(self.runtime.clone())
            .embedding_runtime(self.embeddings.clone())
            .identity_store(Arc::new(MemoryIdentityStore::with_id("dev_test")))
            .handler(handler.clone())
            .hardware(HardwareCapabilities::synthetic(self.memory_mb, 4));
        if let Some(transport) = self.transport {
            builder = builder.telemetry_transport(transport);
        }
        if let Some(interval) = self.flush_interval {
            builder = builder.flush_interval(interval);
        }

        Harness {
            sdk: builder.build().unwrap(),
            runtime: self.runtime,
            embeddings: self.embeddings,
            handler,
        }
    }
}
