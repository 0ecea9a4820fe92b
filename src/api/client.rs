//! HTTP client for the edgeinfer backend
//!
//! Authentication yields a bearer token that every later call attaches.
//! Auxiliary calls (registration, latency probe) carry the configured
//! per-request timeout; the rest wait as long as the server takes.

use super::types::{
    AuthRequest, AuthResponse, ErrorBody, RagQueryRequest, RagQueryResponse,
    RegisterDeviceRequest, SyncRequest, SyncResponse, TelemetryBatchRequest,
};
use crate::config::SdkConfig;
use crate::device::DeviceProfile;
use crate::error::SdkError;
use crate::telemetry::{TelemetryEntry, TelemetryTransport};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Backend API client
///
/// # Example
///
/// ```no_run
/// use edgeinfer::api::ApiClient;
/// use edgeinfer::config::SdkConfig;
///
/// # async fn example() -> Result<(), edgeinfer::SdkError> {
/// let config = SdkConfig::default().with_api_key("ei_live_123");
/// let client = ApiClient::new(&config)?;
/// client.authenticate().await?;
/// println!("latency: {}ms", client.probe_latency().await?);
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
    aux_timeout: Duration,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(config: &SdkConfig) -> Result<Self, SdkError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("edgeinfer-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SdkError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
            aux_timeout: config.request_timeout(),
            token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}/api/rag/knowledge-bases/{kb_id}/{action}` with `kb_id` as one
    /// percent-encoded segment
    fn kb_url(&self, kb_id: &str, action: &str) -> Result<reqwest::Url, SdkError> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            SdkError::InvalidRequest(format!("Invalid API URL {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                SdkError::InvalidRequest(format!("API URL {} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(["api", "rag", "knowledge-bases", kb_id, action]);
        Ok(url)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    pub fn clear_token(&self) {
        if let Ok(mut token) = self.token.write() {
            *token = None;
        }
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, SdkError> {
        let token = self.token().ok_or(SdkError::NotInitialized)?;
        Ok(request.bearer_auth(token))
    }

    async fn check(response: Response) -> Result<Response, SdkError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_else(|_| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body
                }
            });

        Err(SdkError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, SdkError> {
        response
            .json::<T>()
            .await
            .map_err(|e| SdkError::Network(format!("Malformed response body: {}", e)))
    }

    /// `POST /api/auth/sdk`; stores the returned bearer token
    pub async fn authenticate(&self) -> Result<(), SdkError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SdkError::Authentication("No API key configured".to_string()))?;

        let response = self
            .http
            .post(self.url("/api/auth/sdk"))
            .json(&AuthRequest { api_key })
            .send()
            .await
            .map_err(|e| SdkError::Authentication(format!("Auth request failed: {}", e)))?;

        let response = Self::check(response).await.map_err(|e| match e {
            SdkError::Api { status, message } => {
                SdkError::Authentication(format!("{} ({})", message, status))
            }
            other => other,
        })?;
        let auth: AuthResponse = Self::json(response).await?;

        if let Ok(mut token) = self.token.write() {
            *token = Some(auth.token);
        }
        info!("Authenticated with {}", self.base_url);
        Ok(())
    }

    /// `POST /api/devices/register`
    pub async fn register_device(
        &self,
        device_id: &str,
        profile: &DeviceProfile,
    ) -> Result<(), SdkError> {
        let request = self
            .http
            .post(self.url("/api/devices/register"))
            .timeout(self.aux_timeout)
            .json(&RegisterDeviceRequest { device_id, profile });

        let response = self.authorized(request)?.send().await?;
        Self::check(response).await?;
        debug!(device_id, "Device registered");
        Ok(())
    }

    /// `POST /api/devices/telemetry`
    pub async fn send_telemetry_batch(
        &self,
        device_id: &str,
        metrics: &[TelemetryEntry],
    ) -> Result<(), SdkError> {
        let request = self
            .http
            .post(self.url("/api/devices/telemetry"))
            .json(&TelemetryBatchRequest { device_id, metrics });

        let response = self.authorized(request)?.send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Legacy per-event `POST /api/telemetry`
    pub async fn send_event(&self, event: &serde_json::Value) -> Result<(), SdkError> {
        let request = self.http.post(self.url("/api/telemetry")).json(event);
        let response = self.authorized(request)?.send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// `POST /api/rag/knowledge-bases/{kb_id}/query`
    pub async fn rag_query(
        &self,
        kb_id: &str,
        query: &str,
        top_k: usize,
        model_id: &str,
    ) -> Result<RagQueryResponse, SdkError> {
        let request = self
            .http
            .post(self.kb_url(kb_id, "query")?)
            .json(&RagQueryRequest {
                query,
                top_k,
                model_id,
            });

        let response = self.authorized(request)?.send().await?;
        let response = Self::check(response).await?;
        Self::json(response).await
    }

    /// `POST /api/rag/knowledge-bases/{kb_id}/sync`
    pub async fn rag_sync(&self, kb_id: &str, device_id: &str) -> Result<SyncResponse, SdkError> {
        let request = self
            .http
            .post(self.kb_url(kb_id, "sync")?)
            .json(&SyncRequest { device_id });

        let response = self.authorized(request)?.send().await?;
        let response = Self::check(response).await?;
        Self::json(response).await
    }

    /// Round trip to `GET /api/health` in milliseconds
    pub async fn probe_latency(&self) -> Result<u64, SdkError> {
        let start = Instant::now();
        let response = self
            .http
            .get(self.url("/api/health"))
            .timeout(self.aux_timeout)
            .send()
            .await?;
        Self::check(response).await?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(latency_ms = elapsed, "Latency probe complete");
        Ok(elapsed)
    }
}

#[async_trait]
impl TelemetryTransport for ApiClient {
    async fn send_batch(&self, device_id: &str, entries: &[TelemetryEntry]) -> Result<(), SdkError> {
        self.send_telemetry_batch(device_id, entries).await
    }

    async fn send_event(&self, event: &serde_json::Value) -> Result<(), SdkError> {
        ApiClient::send_event(self, event).await.map_err(|e| {
            warn!(error = %e, "Telemetry event rejected");
            e
        })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
